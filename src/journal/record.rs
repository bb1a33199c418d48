use byteorder::{ByteOrder, LittleEndian};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::block::{BlockSize, Page};
use crate::journal::checksum::{checksum, CHECKSUM_SIZE};
use crate::journal::transaction::{TransactionId, TransactionState};
use crate::{ErrorKind, Result};

/// ジャーナルが扱える最小のブロックサイズ.
///
/// これ未満だとデータレコードのペイロードが512バイトに満たなくなる.
pub const MIN_BLOCK_SIZE: u16 = 1024;

/// データレコードのペイロードの単位.
pub const PAYLOAD_ALIGNMENT: usize = 512;

const TX_ID_SIZE: usize = 16;
const KIND_OFFSET: usize = TX_ID_SIZE;
const BODY_OFFSET: usize = KIND_OFFSET + 4 /* kind */ + 4 /* reserved */;
const DATA_PAYLOAD_OFFSET: usize = BODY_OFFSET + 8 /* position */ + 4 /* data_size */ + 4 /* index */;

const KIND_BEGIN: u32 = 1;
const KIND_DATA: u32 = 2;
const KIND_COMMIT: u32 = 3;

/// データレコードに格納可能なペイロードの最大バイト数を返す.
///
/// ブロックサイズからレコードヘッダとチェックサムの分を引いて、512の倍数に切り下げた値となる.
///
/// # Examples
///
/// ```
/// use blkjournal::block::BlockSize;
/// use blkjournal::journal::data_payload_capacity;
///
/// assert_eq!(data_payload_capacity(BlockSize::new(4096).unwrap()), 3584);
/// assert_eq!(data_payload_capacity(BlockSize::new(1024).unwrap()), 512);
/// ```
pub fn data_payload_capacity(block_size: BlockSize) -> usize {
    let available = block_size
        .as_usize()
        .saturating_sub(DATA_PAYLOAD_OFFSET + CHECKSUM_SIZE);
    available / PAYLOAD_ALIGNMENT * PAYLOAD_ALIGNMENT
}

/// ジャーナルのログスロットに一つずつ格納されるレコード.
///
/// どの種類も一ブロックに収まり、以下の共通レイアウトを持つ(リトルエンディアン):
///
/// ```text
/// 0..16          トランザクションID
/// 16..20         種類 (Begin=1, Data=2, Commit=3)
/// 20..24         reserved (0)
/// 24..bs-8       種類毎のボディ
/// bs-8..bs       チェックサム (0..bs-8 に対するもの)
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalRecord {
    /// トランザクションの開始.
    Begin(TransactionId),

    /// トランザクションが書き込むデータの断片.
    Data(DataRecord),

    /// トランザクションの終端.
    Commit(CommitRecord),
}
impl JournalRecord {
    /// レコードが属するトランザクションのIDを返す.
    pub fn tx_id(&self) -> TransactionId {
        match *self {
            JournalRecord::Begin(id) => id,
            JournalRecord::Data(ref r) => r.tx_id,
            JournalRecord::Commit(ref r) => r.tx_id,
        }
    }

    /// レコードをエンコードしたページを返す.
    ///
    /// # Errors
    ///
    /// - ブロックサイズが`MIN_BLOCK_SIZE`未満の場合には、種類が`ErrorKind::BadSize`のエラーが返される
    /// - データのサイズがペイロードの上限を超えている場合には、種類が`ErrorKind::Overflow`のエラーが返される
    pub fn to_page(&self, block_size: BlockSize) -> Result<Page> {
        track_assert!(
            block_size.as_u16() >= MIN_BLOCK_SIZE,
            ErrorKind::BadSize; block_size.as_u16()
        );
        let mut page = Page::new(block_size);
        {
            let bytes = page.as_bytes_mut();
            bytes[..TX_ID_SIZE].copy_from_slice(self.tx_id().as_bytes());
            match *self {
                JournalRecord::Begin(_) => {
                    LittleEndian::write_u32(&mut bytes[KIND_OFFSET..], KIND_BEGIN);
                }
                JournalRecord::Data(ref r) => {
                    let capacity = data_payload_capacity(block_size);
                    track_assert!(
                        r.data.len() <= capacity,
                        ErrorKind::Overflow,
                        "too large payload: len={}, capacity={}",
                        r.data.len(),
                        capacity
                    );
                    LittleEndian::write_u32(&mut bytes[KIND_OFFSET..], KIND_DATA);
                    LittleEndian::write_u64(&mut bytes[BODY_OFFSET..], r.position);
                    LittleEndian::write_u32(&mut bytes[BODY_OFFSET + 8..], r.data.len() as u32);
                    LittleEndian::write_u32(&mut bytes[BODY_OFFSET + 12..], r.index);
                    bytes[DATA_PAYLOAD_OFFSET..][..r.data.len()].copy_from_slice(&r.data);
                }
                JournalRecord::Commit(ref r) => {
                    LittleEndian::write_u32(&mut bytes[KIND_OFFSET..], KIND_COMMIT);
                    LittleEndian::write_u32(&mut bytes[BODY_OFFSET..], r.state.as_u32());
                    LittleEndian::write_u64(&mut bytes[BODY_OFFSET + 8..], r.time);
                    LittleEndian::write_u64(&mut bytes[BODY_OFFSET + 16..], r.data_count);
                }
            }
            let tail = bytes.len() - CHECKSUM_SIZE;
            let digest = checksum(&bytes[..tail]);
            LittleEndian::write_u64(&mut bytes[tail..], digest);
        }
        Ok(page)
    }

    /// ページからレコードをデコードする.
    ///
    /// # Errors
    ///
    /// チェックサムの不一致や、未知の種類・状態値、上限を超えるデータサイズが検出された場合には、
    /// 種類が`ErrorKind::DataCorrupt`のエラーが返される.
    pub fn from_page(page: &Page) -> Result<Self> {
        let bytes = page.as_bytes();
        track_assert!(
            bytes.len() >= usize::from(MIN_BLOCK_SIZE),
            ErrorKind::BadSize; bytes.len()
        );
        let tail = bytes.len() - CHECKSUM_SIZE;
        let expected = LittleEndian::read_u64(&bytes[tail..]);
        track_assert_eq!(
            checksum(&bytes[..tail]),
            expected,
            ErrorKind::DataCorrupt,
            "journal record checksum mismatch"
        );

        let mut id = [0; TX_ID_SIZE];
        id.copy_from_slice(&bytes[..TX_ID_SIZE]);
        let tx_id = TransactionId::from_bytes(id);

        let kind = LittleEndian::read_u32(&bytes[KIND_OFFSET..]);
        let record = match kind {
            KIND_BEGIN => JournalRecord::Begin(tx_id),
            KIND_DATA => {
                let position = LittleEndian::read_u64(&bytes[BODY_OFFSET..]);
                let data_size = LittleEndian::read_u32(&bytes[BODY_OFFSET + 8..]) as usize;
                let index = LittleEndian::read_u32(&bytes[BODY_OFFSET + 12..]);
                let capacity = data_payload_capacity(page.block_size());
                track_assert!(
                    data_size <= capacity,
                    ErrorKind::DataCorrupt,
                    "too large payload: data_size={}, capacity={}",
                    data_size,
                    capacity
                );
                let data = bytes[DATA_PAYLOAD_OFFSET..][..data_size].to_vec();
                JournalRecord::Data(DataRecord {
                    tx_id,
                    position,
                    index,
                    data,
                })
            }
            KIND_COMMIT => {
                let state = LittleEndian::read_u32(&bytes[BODY_OFFSET..]);
                let state = track!(TransactionState::from_u32(state))?;
                let time = LittleEndian::read_u64(&bytes[BODY_OFFSET + 8..]);
                let data_count = LittleEndian::read_u64(&bytes[BODY_OFFSET + 16..]);
                JournalRecord::Commit(CommitRecord {
                    tx_id,
                    state,
                    time,
                    data_count,
                })
            }
            _ => track_panic!(ErrorKind::DataCorrupt, "Unknown journal record kind: {}", kind),
        };
        Ok(record)
    }
}

/// トランザクションが書き込むデータの断片.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRecord {
    /// トランザクションID.
    pub tx_id: TransactionId,

    /// 書き込み先のデバイス上の絶対位置(バイト単位).
    pub position: u64,

    /// トランザクション内での通し番号 (`0`始まり).
    pub index: u32,

    /// ペイロード.
    pub data: Vec<u8>,
}
impl DataRecord {
    /// 書き込み範囲の終端位置を返す.
    ///
    /// 終端が`u64`で表現できない場合には`None`を返す.
    pub fn end(&self) -> Option<u64> {
        self.position.checked_add(self.data.len() as u64)
    }
}

/// トランザクションの終端を表すレコード.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    /// トランザクションID.
    pub tx_id: TransactionId,

    /// トランザクションの終了状態.
    pub state: TransactionState,

    /// レコードの作成時刻 (UNIXエポックからのナノ秒).
    pub time: u64,

    /// トランザクションに属するデータレコードの数.
    pub data_count: u64,
}
impl CommitRecord {
    /// 現在時刻を持つ、コミット済み状態のレコードを生成する.
    pub fn committed(tx_id: TransactionId, data_count: u64) -> Self {
        CommitRecord {
            tx_id,
            state: TransactionState::Committed,
            time: unix_time_nanos(),
            data_count,
        }
    }
}

fn unix_time_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() * 1_000_000_000 + u64::from(d.subsec_nanos()))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use trackable::result::TestResult;

    use super::*;
    use crate::ErrorKind;

    fn records(tx_id: TransactionId) -> Vec<JournalRecord> {
        vec![
            JournalRecord::Begin(tx_id),
            JournalRecord::Data(DataRecord {
                tx_id,
                position: 20480,
                index: 0,
                data: vec![7; 512],
            }),
            JournalRecord::Data(DataRecord {
                tx_id,
                position: 0xFFFF_FFFF_0000,
                index: 1,
                data: b"foo".to_vec(),
            }),
            JournalRecord::Commit(CommitRecord::committed(tx_id, 2)),
        ]
    }

    #[test]
    fn encode_and_decode_works() -> TestResult {
        let block_size = BlockSize::new(1024)?;
        let tx_id = TransactionId::new();
        for record in records(tx_id) {
            let page = track!(record.to_page(block_size))?;
            assert_eq!(page.len(), 1024);
            assert_eq!(&page.as_bytes()[..16], tx_id.as_bytes());
            assert_eq!(track!(JournalRecord::from_page(&page))?, record);
        }
        Ok(())
    }

    #[test]
    fn single_byte_corruption_is_detected() -> TestResult {
        let block_size = BlockSize::new(1024)?;
        for record in records(TransactionId::new()) {
            let page = track!(record.to_page(block_size))?;
            for offset in (0..page.len()).step_by(7).chain(Some(page.len() - 1)) {
                let mut corrupted = page.clone();
                corrupted.as_bytes_mut()[offset] ^= 0x80;
                assert_eq!(
                    JournalRecord::from_page(&corrupted).err().map(|e| *e.kind()),
                    Some(ErrorKind::DataCorrupt),
                    "offset={}",
                    offset
                );
            }
        }

        // 未書き込みのスロット
        let zeroed = Page::new(block_size);
        assert_eq!(
            JournalRecord::from_page(&zeroed).err().map(|e| *e.kind()),
            Some(ErrorKind::DataCorrupt)
        );
        Ok(())
    }

    #[test]
    fn payload_capacity_works() -> TestResult {
        assert_eq!(data_payload_capacity(BlockSize::new(1024)?), 512);
        assert_eq!(data_payload_capacity(BlockSize::new(2048)?), 1536);
        assert_eq!(data_payload_capacity(BlockSize::new(4096)?), 3584);
        assert_eq!(data_payload_capacity(BlockSize::min()), 0);

        let tx_id = TransactionId::new();
        let block_size = BlockSize::new(1024)?;
        let too_large = JournalRecord::Data(DataRecord {
            tx_id,
            position: 0,
            index: 0,
            data: vec![0; 513],
        });
        assert_eq!(
            too_large.to_page(block_size).err().map(|e| *e.kind()),
            Some(ErrorKind::Overflow)
        );

        let begin = JournalRecord::Begin(tx_id);
        assert_eq!(
            begin.to_page(BlockSize::min()).err().map(|e| *e.kind()),
            Some(ErrorKind::BadSize)
        );
        Ok(())
    }

    #[test]
    fn unknown_kind_is_rejected() -> TestResult {
        let block_size = BlockSize::new(1024)?;
        let mut page = track!(JournalRecord::Begin(TransactionId::new()).to_page(block_size))?;
        {
            let bytes = page.as_bytes_mut();
            LittleEndian::write_u32(&mut bytes[KIND_OFFSET..], 9);
            let tail = bytes.len() - CHECKSUM_SIZE;
            let digest = checksum(&bytes[..tail]);
            LittleEndian::write_u64(&mut bytes[tail..], digest);
        }
        assert_eq!(
            JournalRecord::from_page(&page).err().map(|e| *e.kind()),
            Some(ErrorKind::DataCorrupt)
        );
        Ok(())
    }
}
