use futures::sync::oneshot;
use futures::{Async, Future, Poll};
use slog::Logger;
use std::sync::mpsc as std_mpsc;
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use trackable::error::ErrorKindExt;

use crate::journal::record::{CommitRecord, JournalRecord};
use crate::journal::transaction::{TransactionShared, TransactionState};
use crate::journal::JournalShared;
use crate::nvm::{NonVolatileMemory, WriteFlags};
use crate::{Error, ErrorKind, Result};

/// コミットスレッドに送られるコマンド.
#[derive(Debug)]
pub(crate) enum Command {
    Commit(Arc<TransactionShared>),
    Stop,
}

pub(crate) type CommandSender = Sender<Command>;

/// ジャーナルのコミット用スレッド.
///
/// 受信したコミット要求群をバッチにまとめて、
/// レコード群のログスロットへの書き込みと、一回のバリア付きヘッダ書き込みで確定させる.
pub(crate) struct JournalThread<N: NonVolatileMemory> {
    shared: Arc<JournalShared<N>>,
    command_rx: Receiver<Command>,
    poll_interval: Duration,
    start: u64,
    logger: Logger,
}
impl<N: NonVolatileMemory> JournalThread<N> {
    /// コミットスレッドを起動する.
    pub fn spawn(
        shared: Arc<JournalShared<N>>,
        start: u64,
        poll_interval: Duration,
    ) -> (CommandSender, JournalThreadMonitor) {
        let (command_tx, command_rx) = std_mpsc::channel();
        let (exit_tx, exit_rx) = oneshot::channel();
        let logger = shared.logger.new(o!("journal_start" => start));

        thread::spawn(move || {
            let mut this = JournalThread {
                shared,
                command_rx,
                poll_interval,
                start,
                logger,
            };
            debug!(this.logger, "Commit thread started");
            let result = loop {
                match track!(this.run_once()) {
                    Err(e) => break Err(e),
                    Ok(false) => break Ok(()),
                    Ok(true) => {}
                }
            };
            this.cancel_remaining_commands();
            debug!(this.logger, "Commit thread stopped");
            let _ = exit_tx.send(result);
        });

        (command_tx, JournalThreadMonitor(exit_rx))
    }

    fn run_once(&mut self) -> Result<bool> {
        match self.command_rx.recv_timeout(self.poll_interval) {
            Err(RecvTimeoutError::Disconnected) => Ok(false),
            Err(RecvTimeoutError::Timeout) => {
                self.run_side_job_once();
                Ok(true)
            }
            Ok(command) => {
                let mut batch = Vec::new();
                let mut running = true;
                let mut next = Some(command);
                while let Some(command) = next.take() {
                    match command {
                        Command::Commit(tx) => batch.push(tx),
                        Command::Stop => running = false,
                    }
                    next = self.command_rx.try_recv().ok();
                }
                if !batch.is_empty() {
                    self.commit_batch(batch);
                }
                Ok(running)
            }
        }
    }

    /// 暇な時に実行される補助タスク.
    fn run_side_job_once(&mut self) {
        if let Err(e) = track!(self.shared.flush(false)) {
            error!(self.logger, "Cannot flush journal header"; "error" => %e);
        }
    }

    fn commit_batch(&mut self, batch: Vec<Arc<TransactionShared>>) {
        self.shared.metrics.commit_batches.increment();

        let committed = {
            let batch_guard = match track!(self.shared.lock_batch()) {
                Err(e) => {
                    error!(self.logger, "Cannot start commit batch"; "error" => %e);
                    self.fail_batch(&batch, e);
                    return;
                }
                Ok(guard) => guard,
            };

            let mut allocated = 0;
            match track!(self.write_batch(&batch, &mut allocated)) {
                Err(e) => {
                    error!(self.logger, "Commit batch failed";
                           "transactions" => batch.len(), "allocated_slots" => allocated,
                           "error" => %e);

                    // 巻き戻しが完了するまで、ヘッダの永続化はブロックされる
                    if let Err(e) = track!(self.shared.rewind_slots(allocated)) {
                        error!(self.logger, "Cannot roll back failed commit batch"; "error" => %e);
                    }
                    drop(batch_guard);
                    self.fail_batch(&batch, e);
                    return;
                }
                Ok(committed) => committed,
            }
        };

        let mut slots_total = 0;
        for (tx, slots) in committed {
            slots_total += slots.len();
            match tx.lock() {
                Err(e) => {
                    warn!(self.logger, "Cannot notify commit"; "tx" => %tx.id(), "error" => %e);
                }
                Ok(mut inner) => {
                    inner.state = TransactionState::Committed;
                    inner.slots = slots;
                    inner.reply(Ok(()));
                    self.shared.metrics.committed_transactions.increment();
                }
            }
        }
        debug!(self.logger, "Commit batch completed";
               "transactions" => batch.len(), "slots" => slots_total);

        if let Err(e) = track!(self.shared.compact()) {
            warn!(self.logger, "Compaction failed"; "error" => %e);
        }
    }

    /// バッチ内のトランザクション群のレコードを書き込み、最後にヘッダを永続化する.
    ///
    /// 書き込まれたトランザクションと、それぞれに割り当てたスロット群の組を返す.
    fn write_batch<'a>(
        &self,
        batch: &'a [Arc<TransactionShared>],
        allocated: &mut u64,
    ) -> Result<Vec<(&'a Arc<TransactionShared>, Vec<u64>)>> {
        let mut committed = Vec::with_capacity(batch.len());
        for tx in batch {
            if let Some(slots) = track!(self.write_records(tx, allocated))? {
                committed.push((tx, slots));
            }
        }
        track!(self.shared.flush_header())?;
        Ok(committed)
    }

    /// トランザクションのレコード群をログスロットに書き込み、割り当てたスロット群を返す.
    ///
    /// 既に取り消されているトランザクションに対しては`None`を返す.
    fn write_records(&self, tx: &TransactionShared, allocated: &mut u64) -> Result<Option<Vec<u64>>> {
        let pages = {
            let mut inner = track!(tx.lock())?;
            if inner.state != TransactionState::Committing {
                return Ok(None);
            }
            inner.in_batch = true;

            let mut records = Vec::with_capacity(inner.data.len() + 2);
            records.push(JournalRecord::Begin(tx.id()));
            records.extend(inner.data.iter().cloned().map(JournalRecord::Data));
            records.push(JournalRecord::Commit(CommitRecord::committed(
                tx.id(),
                inner.data.len() as u64,
            )));

            let mut pages = Vec::with_capacity(records.len());
            for record in records {
                let page = track!(record.to_page(self.shared.block_size))?;
                pages.push((record, page));
            }
            pages
        };

        let mut slots = Vec::with_capacity(pages.len());
        for (record, page) in pages {
            let slot = track!(self.shared.allocate_slot())?;
            *allocated += 1;
            slots.push(slot);

            let position = self.shared.slot_position(self.start, slot);
            track!(self.shared.nvm.write(&page, position, WriteFlags::PLAIN))?;
            self.shared.metrics.count_written_record(&record);
        }
        Ok(Some(slots))
    }

    /// 失敗したバッチ内の全てのトランザクションを、同じエラーで終了させる.
    fn fail_batch(&self, batch: &[Arc<TransactionShared>], e: Error) {
        for tx in batch {
            let mut inner = match tx.lock() {
                Err(e) => {
                    warn!(self.logger, "Cannot notify failure"; "tx" => %tx.id(), "error" => %e);
                    continue;
                }
                Ok(inner) => inner,
            };
            if inner.state != TransactionState::Committing {
                continue;
            }
            inner.state = TransactionState::Canceled;
            inner.reply(Err(e.clone()));
            self.shared.metrics.failed_transactions.increment();
        }
    }

    /// 停止時に、未処理のコミット要求群を取り消す.
    fn cancel_remaining_commands(&mut self) {
        loop {
            match self.command_rx.try_recv() {
                Ok(Command::Commit(tx)) => {
                    if let Ok(mut inner) = tx.lock() {
                        if inner.state == TransactionState::Committing {
                            inner.state = TransactionState::Canceled;
                            let e: Error = ErrorKind::Cancelled
                                .cause("journal is stopping")
                                .into();
                            inner.reply(Err(track!(e)));
                            self.shared.metrics.cancelled_transactions.increment();
                        }
                    }
                }
                Ok(Command::Stop) => {}
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
    }
}

/// コミットスレッドの死活監視用オブジェクト.
#[derive(Debug)]
pub(crate) struct JournalThreadMonitor(oneshot::Receiver<Result<()>>);
impl Future for JournalThreadMonitor {
    type Item = ();
    type Error = Error;
    fn poll(&mut self) -> Poll<Self::Item, Self::Error> {
        match self.0.poll() {
            Err(_) => track_panic!(ErrorKind::Other, "commit thread terminated unintentionally"),
            Ok(Async::NotReady) => Ok(Async::NotReady),
            Ok(Async::Ready(result)) => track!(result).map(Async::Ready),
        }
    }
}
