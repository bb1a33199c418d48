use std::sync::{Arc, Mutex};

use crate::block::{BlockSize, Page};
use crate::nvm::{NonVolatileMemory, WriteFlags};
use crate::{Error, Result};

/// インスタンスを共有可能な、メモリベースの`NonVolatileMemory`の実装.
///
/// クローンされたインスタンス同士は、同じメモリ領域を参照する.
///
/// # 注意
///
/// これは主にテストや性能計測用途を意図した実装であり、
/// `NonVolatileMemory`が本来要求する"不揮発性"は満たしていない.
///
/// ただし`to_bytes()`で任意の時点の内容を取り出し、それを元に新しいインスタンスを生成することで、
/// "その時点でプロセスがクラッシュした場合"のデバイスの状態を再現することは可能.
#[derive(Debug, Clone)]
pub struct MemoryNvm {
    memory: Arc<Mutex<Vec<u8>>>,
    block_size: BlockSize,
}
impl MemoryNvm {
    /// 新しい`MemoryNvm`インスタンスを生成する.
    ///
    /// `MemoryNvm::with_block_size(memory, BlockSize::min())`と等しい。
    pub fn new(memory: Vec<u8>) -> Self {
        Self::with_block_size(memory, BlockSize::min())
    }

    /// ブロックサイズを指定して`MemoryNvm`インスタンスを生成する.
    pub fn with_block_size(memory: Vec<u8>, block_size: BlockSize) -> Self {
        MemoryNvm {
            memory: Arc::new(Mutex::new(memory)),
            block_size,
        }
    }

    /// 現在のメモリの内容のコピーを返す.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let memory = track!(self.memory.lock().map_err(Error::from))?;
        Ok(memory.clone())
    }

    /// 指定範囲のメモリの内容のコピーを返す.
    ///
    /// 範囲外の部分は無視される.
    pub fn read_bytes(&self, position: u64, len: usize) -> Result<Vec<u8>> {
        let memory = track!(self.memory.lock().map_err(Error::from))?;
        let start = (position as usize).min(memory.len());
        let end = start.saturating_add(len).min(memory.len());
        Ok(memory[start..end].to_vec())
    }
}
impl NonVolatileMemory for MemoryNvm {
    fn block_size(&self) -> BlockSize {
        self.block_size
    }
    fn capacity(&self) -> u64 {
        self.memory.lock().map(|m| m.len() as u64).unwrap_or(0)
    }
    fn read(&self, page: &mut Page, position: u64) -> Result<()> {
        track!(self.check_range(page, position))?;
        let memory = track!(self.memory.lock().map_err(Error::from))?;
        let start = position as usize;
        let len = page.len();
        page.as_bytes_mut()
            .copy_from_slice(&memory[start..start + len]);
        Ok(())
    }
    fn write(&self, page: &Page, position: u64, _flags: WriteFlags) -> Result<()> {
        track!(self.check_range(page, position))?;
        let mut memory = track!(self.memory.lock().map_err(Error::from))?;
        let start = position as usize;
        memory[start..start + page.len()].copy_from_slice(page.as_bytes());
        Ok(())
    }
    fn sync(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use trackable::result::TestResult;

    use super::*;
    use crate::nvm::{NonVolatileMemory, WriteFlags};
    use crate::ErrorKind;

    #[test]
    fn it_works() -> TestResult {
        let nvm = MemoryNvm::new(vec![0; 2048]);
        assert_eq!(nvm.capacity(), 2048);
        assert_eq!(nvm.block_size(), BlockSize::min());

        // read, write
        let mut page = nvm.create_zeroed_page();
        track!(nvm.read(&mut page, 512))?;
        assert_eq!(page.as_bytes(), &[0; 512][..]);

        track!(page.write_at(0, &[1; 512]))?;
        track!(nvm.write(&page, 1024, WriteFlags::PLAIN))?;
        assert_eq!(track!(nvm.read_bytes(1024, 4))?, vec![1; 4]);

        let mut buf = nvm.create_zeroed_page();
        track!(nvm.read(&mut buf, 1024))?;
        assert_eq!(buf, page);

        // 共有
        let shared = nvm.clone();
        let mut buf = shared.create_zeroed_page();
        track!(shared.read(&mut buf, 1024))?;
        assert_eq!(buf, page);
        assert_eq!(track!(shared.to_bytes())?, track!(nvm.to_bytes())?);
        Ok(())
    }

    #[test]
    fn error_handlings_works() -> TestResult {
        let nvm = MemoryNvm::new(vec![0; 1024]);
        let mut page = nvm.create_zeroed_page();

        // アライメントが不正
        assert_eq!(
            nvm.read(&mut page, 100).err().map(|e| *e.kind()),
            Some(ErrorKind::InvalidInput)
        );

        // 容量超過
        assert_eq!(
            nvm.write(&page, 1024, WriteFlags::PLAIN)
                .err()
                .map(|e| *e.kind()),
            Some(ErrorKind::InvalidInput)
        );

        // ブロックサイズの異なるページ
        let nvm = MemoryNvm::with_block_size(vec![0; 4096], BlockSize::new(1024)?);
        let page = Page::new(BlockSize::min());
        assert_eq!(
            nvm.write(&page, 0, WriteFlags::PLAIN).err().map(|e| *e.kind()),
            Some(ErrorKind::InvalidInput)
        );
        Ok(())
    }
}
