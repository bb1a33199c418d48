use std::hash::Hasher;
use twox_hash::XxHash64;

/// チェックサムのバイト幅.
pub const CHECKSUM_SIZE: usize = 8;

const SEED: u64 = 0;

/// `bytes`の64bitチェックサム(XXH64)を計算する.
pub fn checksum(bytes: &[u8]) -> u64 {
    let mut hasher = XxHash64::with_seed(SEED);
    hasher.write(bytes);
    hasher.finish()
}
