use std::ops::Range;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

use crate::block::{BlockSize, Page};
use crate::nvm::{MemoryNvm, NonVolatileMemory, WriteFlags};
use crate::{Error, ErrorKind, Result};

/// 書き込みの失敗や一時停止を注入可能な`NonVolatileMemory`の実装 (テスト用).
#[derive(Debug, Clone)]
pub struct FaultyNvm {
    inner: MemoryNvm,
    faults: Arc<Mutex<Faults>>,
}

#[derive(Debug, Default)]
struct Faults {
    writes: u64,
    fail_at_write: Option<u64>,
    fail_range: Option<Range<u64>>,
    pause_at_write: Option<(u64, Sender<()>, Receiver<()>)>,
}

impl FaultyNvm {
    pub fn new(inner: MemoryNvm) -> Self {
        FaultyNvm {
            inner,
            faults: Arc::default(),
        }
    }

    pub fn inner(&self) -> &MemoryNvm {
        &self.inner
    }

    /// 今から数えて`n`回目(1始まり)の書き込みを失敗させる.
    pub fn fail_nth_write(&self, n: u64) {
        let mut faults = self.faults.lock().unwrap();
        faults.fail_at_write = Some(faults.writes + n);
    }

    /// `range`と重なる位置への書き込みを全て失敗させる.
    pub fn fail_writes_within(&self, range: Range<u64>) {
        self.faults.lock().unwrap().fail_range = Some(range);
    }

    /// 今から数えて`n`回目(1始まり)の書き込みを、実際の書き込みを行う直前で一時停止させる.
    ///
    /// 失敗が注入されている場合も、失敗する前に停止する.
    pub fn pause_nth_write(&self, n: u64) -> WritePause {
        let (reached_tx, reached_rx) = mpsc::channel();
        let (resume_tx, resume_rx) = mpsc::channel();
        let mut faults = self.faults.lock().unwrap();
        faults.pause_at_write = Some((faults.writes + n, reached_tx, resume_rx));
        WritePause {
            reached: reached_rx,
            resume: resume_tx,
        }
    }

    pub fn clear(&self) {
        let mut faults = self.faults.lock().unwrap();
        faults.fail_at_write = None;
        faults.fail_range = None;
        faults.pause_at_write = None;
    }

    fn next_write(&self, position: u64, len: u64) -> Result<(bool, Option<(Sender<()>, Receiver<()>)>)> {
        let mut faults = track!(self.faults.lock().map_err(Error::from))?;
        faults.writes += 1;
        let writes = faults.writes;

        let pause = if faults.pause_at_write.as_ref().map(|p| p.0) == Some(writes) {
            faults.pause_at_write.take().map(|(_, reached, resume)| (reached, resume))
        } else {
            None
        };
        let fail = faults.fail_at_write == Some(writes)
            || faults
                .fail_range
                .as_ref()
                .map_or(false, |r| position < r.end && r.start < position + len);
        Ok((fail, pause))
    }
}
impl NonVolatileMemory for FaultyNvm {
    fn block_size(&self) -> BlockSize {
        self.inner.block_size()
    }
    fn capacity(&self) -> u64 {
        self.inner.capacity()
    }
    fn read(&self, page: &mut Page, position: u64) -> Result<()> {
        self.inner.read(page, position)
    }
    fn write(&self, page: &Page, position: u64, flags: WriteFlags) -> Result<()> {
        let (fail, pause) = track!(self.next_write(position, page.len() as u64))?;
        if let Some((reached, resume)) = pause {
            let _ = reached.send(());
            let _ = resume.recv();
        }
        if fail {
            track_panic!(ErrorKind::Other, "injected write failure: position={}", position);
        }
        self.inner.write(page, position, flags)
    }
    fn sync(&self) -> Result<()> {
        self.inner.sync()
    }
}

/// `FaultyNvm::pause_nth_write`で一時停止させた書き込みの操作口.
#[derive(Debug)]
pub struct WritePause {
    reached: Receiver<()>,
    resume: Sender<()>,
}
impl WritePause {
    /// 対象の書き込みが停止位置に到達するまで待機する.
    pub fn wait_reached(&self) {
        let _ = self.reached.recv();
    }

    /// 停止中の書き込みを再開させる.
    pub fn resume(&self) {
        let _ = self.resume.send(());
    }
}
