use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;

use crate::block::{BlockSize, Page};
use crate::nvm::{NonVolatileMemory, WriteFlags};
use crate::{Error, ErrorKind, Result};

/// `FileNvm`のビルダ.
#[derive(Debug, Clone)]
pub struct FileNvmBuilder {
    direct_io: bool,
    exclusive_lock: bool,
    block_size: BlockSize,
}

impl FileNvmBuilder {
    /// デフォルト設定で`FileNvmBuilder`インスタンスを作成する.
    ///
    /// デフォルトでは、バッファリングなしI/Oと排他ロックが有効で、ブロックサイズは`4096`となる.
    pub fn new() -> Self {
        FileNvmBuilder {
            direct_io: true,
            exclusive_lock: true,
            block_size: BlockSize::new(4096).expect("Never fails"),
        }
    }

    /// バッファリングなしI/O(Linuxでは`O_DIRECT`、macOSでは`F_NOCACHE`)を行うかどうかを設定する.
    pub fn direct_io(&mut self, enabled: bool) -> &mut Self {
        self.direct_io = enabled;
        self
    }

    /// 対象ファイルに`flock(LOCK_EX)`を掛けて、他プロセスからの同時利用を防ぐかどうかを設定する.
    pub fn exclusive_lock(&mut self, enabled: bool) -> &mut Self {
        self.exclusive_lock = enabled;
        self
    }

    /// 読み書きの単位となるブロックサイズを設定する.
    ///
    /// ジャーナルを配置する場合には`MIN_BLOCK_SIZE`以上である必要がある.
    pub fn block_size(&mut self, block_size: BlockSize) -> &mut Self {
        self.block_size = block_size;
        self
    }

    /// ファイルを新規に作成して`FileNvm`インスタンスを生成する.
    ///
    /// ファイルは`capacity`バイトに拡張され、未書き込みの領域はゼロとして読み込まれる.
    pub fn create<P: AsRef<Path>>(&mut self, filepath: P, capacity: u64) -> Result<FileNvm> {
        track_assert!(
            self.block_size.is_aligned(capacity),
            ErrorKind::InvalidInput,
            "unaligned capacity: {}",
            capacity
        );
        if let Some(dir) = filepath.as_ref().parent() {
            track_io!(fs::create_dir_all(dir))?;
        }
        let file = track!(self.open_file(filepath.as_ref(), true))?;
        track_io!(file.set_len(capacity))?;
        Ok(FileNvm::new(file, capacity, self.block_size))
    }

    /// 既存のファイルないしブロックデバイスを開いて`FileNvm`インスタンスを生成する。
    ///
    /// 容量は、開いた対象の末尾位置から求められる.
    pub fn open<P: AsRef<Path>>(&mut self, filepath: P) -> Result<FileNvm> {
        let mut file = track!(self.open_file(filepath.as_ref(), false))?;
        let size = track_io!(file.seek(SeekFrom::End(0)))?;
        let capacity = self.block_size.floor_align(size);
        Ok(FileNvm::new(file, capacity, self.block_size))
    }

    fn open_file(&self, filepath: &Path, create: bool) -> Result<File> {
        let mut options = fs::OpenOptions::new();
        options.read(true).write(true).create(create);
        if self.direct_io {
            set_direct_io_flag(&mut options);
        }
        let file = track_io!(options.open(filepath))?;
        if self.exclusive_lock {
            track!(lock_exclusive(&file))?;
        }
        if self.direct_io {
            track!(disable_page_cache(&file))?;
        }
        Ok(file)
    }
}
impl Default for FileNvmBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// ファイルベースの`NonVolatileMemory`の実装.
///
/// 通常のファイルの他に、ブロックデバイスのスペシャルファイルを対象とすることも可能.
///
/// UNIX環境であれば、ファイルは`O_DIRECT`フラグ付きでオープンされる.
///
/// バリア付き書き込みの前、およびdurableな書き込みの後には`fdatasync`が発行される.
///
/// # 参考
///
/// `O_DIRECT`と`O_SYNC/O_DSYNC`に関して:
///
/// - [http://stackoverflow.com/questions/5055859/](http://stackoverflow.com/questions/5055859/)
/// - [https://lwn.net/Articles/457667/](https://lwn.net/Articles/457667/)
#[derive(Debug)]
pub struct FileNvm {
    file: Mutex<File>,
    capacity: u64,
    block_size: BlockSize,
}
impl FileNvm {
    /// デフォルト設定でファイルを新規に作成して`FileNvm`インスタンスを生成する.
    ///
    /// デフォルト設定では、O_DIRECT (MacではF_NOCACHE）でのバッファリングなしI/Oを行い
    /// ファイルアクセスに対する排他制御を行う。
    pub fn create<P: AsRef<Path>>(filepath: P, capacity: u64) -> Result<Self> {
        FileNvmBuilder::new().create(filepath, capacity)
    }

    /// デフォルト設定で既存のファイルを開き`FileNvm`インスタンスを生成する。
    pub fn open<P: AsRef<Path>>(filepath: P) -> Result<Self> {
        FileNvmBuilder::new().open(filepath)
    }

    fn new(file: File, capacity: u64, block_size: BlockSize) -> Self {
        FileNvm {
            file: Mutex::new(file),
            capacity,
            block_size,
        }
    }
}
impl NonVolatileMemory for FileNvm {
    fn block_size(&self) -> BlockSize {
        self.block_size
    }
    fn capacity(&self) -> u64 {
        self.capacity
    }
    fn read(&self, page: &mut Page, position: u64) -> Result<()> {
        track!(self.check_range(page, position))?;
        let mut file = track!(self.file.lock().map_err(Error::from))?;
        track_io!(file.seek(SeekFrom::Start(position)))?;
        track_io!(file.read_exact(page.as_bytes_mut()))?;
        Ok(())
    }
    fn write(&self, page: &Page, position: u64, flags: WriteFlags) -> Result<()> {
        track!(self.check_range(page, position))?;
        let mut file = track!(self.file.lock().map_err(Error::from))?;
        if flags.barrier {
            track_io!(file.sync_data())?;
        }
        track_io!(file.seek(SeekFrom::Start(position)))?;
        track_io!(file.write_all(page.as_bytes()))?;
        if flags.durable {
            track_io!(file.sync_data())?;
        }
        Ok(())
    }
    fn sync(&self) -> Result<()> {
        let file = track!(self.file.lock().map_err(Error::from))?;
        track_io!(file.sync_data())?;
        Ok(())
    }
}

#[cfg(target_os = "linux")]
fn set_direct_io_flag(options: &mut fs::OpenOptions) {
    use std::os::unix::fs::OpenOptionsExt;
    options.custom_flags(libc::O_DIRECT);
}

#[cfg(not(target_os = "linux"))]
fn set_direct_io_flag(_options: &mut fs::OpenOptions) {}

#[cfg(target_os = "macos")]
fn disable_page_cache(file: &File) -> Result<()> {
    use std::os::unix::io::AsRawFd;
    if unsafe { libc::fcntl(file.as_raw_fd(), libc::F_NOCACHE, 1) } != 0 {
        return track_io!(Err(io::Error::last_os_error()));
    }
    Ok(())
}

#[cfg(not(target_os = "macos"))]
fn disable_page_cache(_file: &File) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
fn lock_exclusive(file: &File) -> Result<()> {
    use std::os::unix::io::AsRawFd;
    if unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) } != 0 {
        return track_io!(Err(io::Error::last_os_error()));
    }
    Ok(())
}

#[cfg(not(unix))]
fn lock_exclusive(_file: &File) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::mem;
    use tempdir::TempDir;
    use trackable::result::TestResult;

    use super::*;
    use crate::nvm::WriteFlags;

    fn builder() -> FileNvmBuilder {
        // tmpfs等では O_DIRECT が使えないことがあるので、テストでは無効にしておく
        let mut builder = FileNvmBuilder::new();
        builder.direct_io(false);
        builder
    }

    #[test]
    fn open_and_create_works() -> TestResult {
        let dir = track_io!(TempDir::new("blkjournal_test"))?;
        let capacity = 10 * 4096;

        // 存在しないファイルは開けない
        assert!(builder().open(dir.path().join("foo")).is_err());

        // ファイル作成
        let nvm = track!(builder().create(dir.path().join("foo"), capacity))?;
        assert_eq!(nvm.capacity(), capacity);

        let mut page = nvm.create_zeroed_page();
        track!(page.write_at(0, b"bar"))?;
        track!(nvm.write(&page, 4096, WriteFlags::BARRIER_DURABLE))?;

        // 同じファイルを同時に開くことはできない
        assert!(builder().open(dir.path().join("foo")).is_err());

        // 一度閉じれば、オープン可能
        mem::drop(nvm);
        let nvm = track!(builder().open(dir.path().join("foo")))?;
        assert_eq!(nvm.capacity(), capacity);

        let mut buf = nvm.create_zeroed_page();
        track!(nvm.read(&mut buf, 4096))?;
        assert_eq!(buf, page);

        // 未書き込みの領域はゼロ
        track!(nvm.read(&mut buf, 0))?;
        assert_eq!(buf, nvm.create_zeroed_page());
        Ok(())
    }

    #[test]
    fn error_handlings_works() -> TestResult {
        let dir = track_io!(TempDir::new("blkjournal_test"))?;
        let mut builder = builder();
        builder.block_size(BlockSize::min());

        // 容量がブロック境界に揃っていない
        assert!(builder.create(dir.path().join("foo"), 1000).is_err());

        let nvm = track!(builder.create(dir.path().join("foo"), 1024))?;
        let page = nvm.create_zeroed_page();
        assert!(nvm.write(&page, 1024, WriteFlags::PLAIN).is_err()); // キャパシティ超過
        assert!(nvm.write(&page, 100, WriteFlags::PLAIN).is_err()); // アライメントが不正
        assert!(nvm.write(&page, 512, WriteFlags::PLAIN).is_ok());
        Ok(())
    }
}
