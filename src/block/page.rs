use rand::RngCore;
use std::fmt::{self, Write};

use crate::block::BlockSize;
use crate::{ErrorKind, Result};

const HEX_DUMP_WIDTH: usize = 16;

/// ブロックサイズ分のメモリバッファ.
///
/// [`NonVolatileMemory`]に対する読み書きは、このページ単位で行われる.
///
/// バッファの先頭アドレスはブロック境界に揃えられているので、
/// `O_DIRECT`でオープンされたデバイスに対しても、そのまま読み書きに使用可能.
///
/// [`NonVolatileMemory`]: ../nvm/trait.NonVolatileMemory.html
pub struct Page {
    // アドレスを揃えるために、ブロックサイズよりも(最大で`block_size - 1`バイト)余分に確保している
    buf: Vec<u8>,
    offset: usize,
    block_size: BlockSize,
}
impl Page {
    /// ゼロ埋めされた新しいページを生成する.
    pub fn new(block_size: BlockSize) -> Self {
        let buf = vec![0; block_size.as_usize() * 2 - 1];
        let address = buf.as_ptr() as u64;
        let offset = (block_size.ceil_align(address) - address) as usize;
        Page {
            buf,
            offset,
            block_size,
        }
    }

    /// `bytes`の内容で埋められたページを生成する.
    ///
    /// # Errors
    ///
    /// `bytes`の長さがブロックサイズを超えている場合には、
    /// 種類が`ErrorKind::Overflow`のエラーが返される.
    pub fn from_bytes(bytes: &[u8], block_size: BlockSize) -> Result<Self> {
        let mut page = Page::new(block_size);
        track!(page.write_at(0, bytes))?;
        Ok(page)
    }

    /// ページのブロックサイズを返す.
    pub fn block_size(&self) -> BlockSize {
        self.block_size
    }

    /// ページのバイト長を返す.
    pub fn len(&self) -> usize {
        self.block_size.as_usize()
    }

    /// ページが空かどうかを判定する.
    ///
    /// ブロックサイズは常に正なので、このメソッドは`false`しか返さない.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// ページ全体をゼロで埋める.
    pub fn zero(&mut self) {
        for b in self.as_bytes_mut() {
            *b = 0;
        }
    }

    /// ページ全体をランダムなバイト列で埋める.
    pub fn fill_random(&mut self) {
        rand::thread_rng().fill_bytes(self.as_bytes_mut());
    }

    /// `offset`から`buf.len()`バイト分を`buf`に読み込む.
    pub fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<()> {
        let end = track!(self.checked_end(offset, buf.len()))?;
        buf.copy_from_slice(&self.as_bytes()[offset..end]);
        Ok(())
    }

    /// `offset`の位置に`bytes`を書き込む.
    pub fn write_at(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        let end = track!(self.checked_end(offset, bytes.len()))?;
        self.as_bytes_mut()[offset..end].copy_from_slice(bytes);
        Ok(())
    }

    /// ページの内容をバイト列として返す.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[self.offset..][..self.len()]
    }

    /// ページの内容を変更可能なバイト列として返す.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        let len = self.len();
        &mut self.buf[self.offset..][..len]
    }

    /// ページの内容を16進数でダンプした文字列を返す.
    ///
    /// # Examples
    ///
    /// ```
    /// use blkjournal::block::{BlockSize, Page};
    ///
    /// let mut page = Page::new(BlockSize::min());
    /// page.write_at(0, b"ab").unwrap();
    /// assert!(page.hex_dump().starts_with("00000000: 61 62 00"));
    /// ```
    pub fn hex_dump(&self) -> String {
        let mut s = String::with_capacity(self.len() * 4);
        for (i, line) in self.as_bytes().chunks(HEX_DUMP_WIDTH).enumerate() {
            let _ = write!(s, "{:08x}:", i * HEX_DUMP_WIDTH);
            for b in line {
                let _ = write!(s, " {:02x}", b);
            }
            s.push('\n');
        }
        s
    }

    fn checked_end(&self, offset: usize, len: usize) -> Result<usize> {
        let end = track_assert_some!(offset.checked_add(len), ErrorKind::Overflow);
        track_assert!(end <= self.len(), ErrorKind::Overflow; offset, len, self.len());
        Ok(end)
    }
}
impl Clone for Page {
    fn clone(&self) -> Self {
        let mut page = Page::new(self.block_size);
        page.as_bytes_mut().copy_from_slice(self.as_bytes());
        page
    }
}
impl PartialEq for Page {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}
impl Eq for Page {}
impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Page {{ block_size: {} }}", self.block_size().as_u16())
    }
}
