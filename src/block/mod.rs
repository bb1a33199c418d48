//! ブロック(デバイスに対する読み書きの最小単位)と、ブロック単位のバッファ.
use crate::{ErrorKind, Result};

pub use self::page::Page;

mod page;

/// デバイスのブロックサイズ.
///
/// ジャーナルのヘッダや各レコードは、それぞれ一つのブロックに収まるように配置される.
/// また[`NonVolatileMemory`]に対する読み書きの位置とサイズは、このブロックサイズの境界に揃っている必要がある.
///
/// 値は常に`BlockSize::MIN`の倍数となる.
///
/// [`NonVolatileMemory`]: ../nvm/trait.NonVolatileMemory.html
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockSize(u16);
impl BlockSize {
    /// セクタサイズ(512バイト).
    ///
    /// 指定可能なブロックサイズの最小値であり、`BlockSize::default()`の値でもある.
    pub const MIN: u16 = 512;

    /// 最小のブロックサイズを返す.
    pub fn min() -> Self {
        BlockSize(Self::MIN)
    }

    /// 新しい`BlockSize`インスタンスを生成する.
    ///
    /// # Errors
    ///
    /// `block_size`が`BlockSize::MIN`の倍数(ゼロを除く)ではない場合には、
    /// 種類が`ErrorKind::InvalidInput`のエラーが返される.
    ///
    /// # Examples
    ///
    /// ```
    /// use blkjournal::ErrorKind;
    /// use blkjournal::block::BlockSize;
    ///
    /// assert_eq!(BlockSize::new(4096).ok().map(|b| b.as_usize()), Some(4096));
    /// assert_eq!(BlockSize::new(0).err().map(|e| *e.kind()), Some(ErrorKind::InvalidInput));
    /// assert_eq!(BlockSize::new(1000).err().map(|e| *e.kind()), Some(ErrorKind::InvalidInput));
    /// ```
    #[allow(clippy::new_ret_no_self)]
    pub fn new(block_size: u16) -> Result<Self> {
        track_assert!(
            block_size != 0 && block_size % Self::MIN == 0,
            ErrorKind::InvalidInput,
            "block size must be a non-zero multiple of {}: {}",
            Self::MIN,
            block_size
        );
        Ok(BlockSize(block_size))
    }

    /// ブロックサイズを`u16`として返す.
    pub fn as_u16(self) -> u16 {
        self.0
    }

    /// ブロックサイズを`u64`として返す.
    pub fn as_u64(self) -> u64 {
        u64::from(self.0)
    }

    /// ブロックサイズを`usize`として返す.
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// `block`番目のブロックの先頭のバイト位置を返す.
    ///
    /// # Examples
    ///
    /// ```
    /// use blkjournal::block::BlockSize;
    ///
    /// let block_size = BlockSize::new(1024).unwrap();
    /// assert_eq!(block_size.block_to_position(20), 20480);
    /// ```
    pub fn block_to_position(self, block: u64) -> u64 {
        block * self.as_u64()
    }

    /// `position`を含むブロックの先頭位置を返す.
    ///
    /// # Examples
    ///
    /// ```
    /// use blkjournal::block::BlockSize;
    ///
    /// let block_size = BlockSize::new(1024).unwrap();
    /// assert_eq!(block_size.floor_align(1023), 0);
    /// assert_eq!(block_size.floor_align(1024), 1024);
    /// assert_eq!(block_size.floor_align(21779), 21504);
    /// ```
    pub fn floor_align(self, position: u64) -> u64 {
        position - position % self.as_u64()
    }

    /// `position`以降で最初のブロック境界を返す.
    pub fn ceil_align(self, position: u64) -> u64 {
        self.floor_align(position + self.as_u64() - 1)
    }

    /// `position`がブロック境界に揃っているかどうかを判定する.
    pub fn is_aligned(self, position: u64) -> bool {
        position % self.as_u64() == 0
    }
}
impl Default for BlockSize {
    fn default() -> Self {
        Self::min()
    }
}
