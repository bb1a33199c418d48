//! 不揮発性メモリ(ブロックデバイス)のインターフェース定義と実装群.
//!
//! このモジュールは[Journal](../journal/struct.Journal.html)がログおよびデータの読み書きに使用する
//! 永続化領域を提供する.
pub use self::file::{FileNvm, FileNvmBuilder};
pub use self::memory::MemoryNvm;

#[cfg(test)]
pub(crate) use self::faulty::FaultyNvm;

use crate::block::{BlockSize, Page};
use crate::{ErrorKind, Result};

#[cfg(test)]
mod faulty;
mod file;
mod memory;

/// 書き込み時の永続化に関するフラグ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteFlags {
    /// バリア付き書き込みかどうか.
    ///
    /// `true`の場合には、それ以前に発行された全ての書き込みが永続化されてから、
    /// この書き込みが行われる.
    pub barrier: bool,

    /// 書き込み完了時点で、その内容が永続化されていることを要求するかどうか.
    ///
    /// いわゆる FUA (Force Unit Access).
    pub durable: bool,
}
impl WriteFlags {
    /// 永続化に関する保証を要求しない、通常の書き込み.
    pub const PLAIN: WriteFlags = WriteFlags {
        barrier: false,
        durable: false,
    };

    /// バリア付き、かつ、完了時に永続化済みとなる書き込み.
    pub const BARRIER_DURABLE: WriteFlags = WriteFlags {
        barrier: true,
        durable: true,
    };
}

/// 不揮発性メモリを表すトレイト.
///
/// "不揮発性メモリ"は「永続化可能なバイト列(領域)」を意味し、
/// ジャーナルのログ領域およびトランザクションの書き込み先として使用される.
///
/// 読み書きは[`Page`]単位で行われ、その際の位置およびページのサイズは、
/// `block_size()`が返すブロック境界にアライメントされている必要がある.
///
/// 複数のスレッド(コミット用のバックグラウンドスレッドと、トランザクションの発行元スレッド群)から
/// 同時に利用されるので、各メソッドは`&self`を受け取り、排他制御は実装側で行う.
///
/// [`Page`]: ../block/struct.Page.html
pub trait NonVolatileMemory: Send + Sync + 'static {
    /// このインスタンスのブロックサイズを返す.
    fn block_size(&self) -> BlockSize;

    /// メモリの容量(バイト単位)を返す.
    fn capacity(&self) -> u64;

    /// `position`から`page`のサイズ分のデータを読み込む.
    ///
    /// # Errors
    ///
    /// 以下の場合には、種類が`ErrorKind::InvalidInput`のエラーが返される:
    ///
    /// - `position`ないしページのサイズがブロック境界に揃っていない
    /// - 読み込み範囲が容量を超えている
    fn read(&self, page: &mut Page, position: u64) -> Result<()>;

    /// `position`に`page`の内容を書き込む.
    ///
    /// 永続化の保証は`flags`によって指定する.
    ///
    /// # Errors
    ///
    /// 以下の場合には、種類が`ErrorKind::InvalidInput`のエラーが返される:
    ///
    /// - `position`ないしページのサイズがブロック境界に揃っていない
    /// - 書き込み範囲が容量を超えている
    fn write(&self, page: &Page, position: u64, flags: WriteFlags) -> Result<()>;

    /// それまでに発行された全ての書き込みを、物理デバイスに同期する.
    ///
    /// 内部的にバッファ管理等を行っておらず、常に内容が同期されている場合には、
    /// このメソッド内で特に何かを行う必要はない。
    fn sync(&self) -> Result<()>;

    /// このインスタンスのブロックサイズを持つ、ゼロ埋めされたページを生成する.
    fn create_zeroed_page(&self) -> Page {
        Page::new(self.block_size())
    }

    /// 読み書き範囲の妥当性を検証する.
    fn check_range(&self, page: &Page, position: u64) -> Result<()> {
        let block_size = self.block_size();
        track_assert!(
            block_size.is_aligned(position),
            ErrorKind::InvalidInput,
            "unaligned position: {}",
            position
        );
        track_assert!(
            block_size.is_aligned(page.len() as u64),
            ErrorKind::InvalidInput,
            "unaligned page size: {}",
            page.len()
        );
        let end = track_assert_some!(
            position.checked_add(page.len() as u64),
            ErrorKind::InvalidInput
        );
        track_assert!(
            end <= self.capacity(),
            ErrorKind::InvalidInput,
            "out of range: position={}, len={}, capacity={}",
            position,
            page.len(),
            self.capacity()
        );
        Ok(())
    }
}
impl<T: NonVolatileMemory> NonVolatileMemory for std::sync::Arc<T> {
    fn block_size(&self) -> BlockSize {
        (**self).block_size()
    }
    fn capacity(&self) -> u64 {
        (**self).capacity()
    }
    fn read(&self, page: &mut Page, position: u64) -> Result<()> {
        (**self).read(page, position)
    }
    fn write(&self, page: &Page, position: u64, flags: WriteFlags) -> Result<()> {
        (**self).write(page, position, flags)
    }
    fn sync(&self) -> Result<()> {
        (**self).sync()
    }
}
