//! 先行書き込みジャーナルとトランザクション.
//!
//! # レイアウト
//!
//! ジャーナルは、デバイス上の`start`ブロック目から始まる`size`個の連続したブロックを占有する.
//!
//! ```text
//! block: start    start+1   start+2         start+size-1
//!        +--------+---------+---------+-----+---------+
//!        | header | slot 0  | slot 1  | ... | slot N  |
//!        +--------+---------+---------+-----+---------+
//! ```
//!
//! - 先頭ブロックは[ヘッダ](struct.JournalHeader.html)
//! - 残りのブロックはレコード用のスロット群で、[LogSlotAllocator](struct.LogSlotAllocator.html)により循環的に管理される
//!
//! # コミットの流れ
//!
//! 1. 利用者は[Transaction]に書き込みを蓄積し、`commit`を呼び出す
//! 2. コミットスレッドが要求群をバッチにまとめ、各トランザクションの`Begin`・`Data`群・`Commit`レコードをスロット群に書き込む
//! 3. バッチ内の全ての書き込みが成功したら、ヘッダをバリア付きで永続化し、待機中のトランザクション群を起床させる
//! 4. 各トランザクションは、自分のデータを最終位置に適用してから、スロットの解放を依頼する
//!
//! ロード時には、ヘッダに記録されている使用中スロット群から、コミット済みのトランザクションが再適用される.
//!
//! [Transaction]: struct.Transaction.html
use futures::Future;
use slog::Logger;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::ops::Range;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;
use trackable::error::ErrorKindExt;

pub use self::builder::JournalBuilder;
pub use self::header::{JournalHeader, MAGIC_NUMBER};
pub use self::record::{
    data_payload_capacity, CommitRecord, DataRecord, JournalRecord, MIN_BLOCK_SIZE,
};
pub use self::slot_allocator::{InUseSlots, LogSlotAllocator};
pub use self::transaction::{Transaction, TransactionId, TransactionState};

use self::replay::replay;
use self::thread::{Command, CommandSender, JournalThread, JournalThreadMonitor};
use self::transaction::TransactionShared;
use crate::block::BlockSize;
use crate::metrics::JournalMetrics;
use crate::nvm::{NonVolatileMemory, WriteFlags};
use crate::{Error, ErrorKind, Result};

mod builder;
mod checksum;
mod header;
mod record;
mod replay;
mod slot_allocator;
mod thread;
mod transaction;

/// ジャーナルの状態.
///
/// `New => Replaying => Running => Stopping => Stopped`の順に遷移する.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JournalStatus {
    New,
    Replaying,
    Running,
    Stopping,
    Stopped,
}

/// ある時点でのジャーナルの内部状態のスナップショット.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalSnapshot {
    /// ジャーナルの状態.
    pub status: JournalStatus,

    /// ジャーナル領域の開始ブロック.
    pub start: u64,

    /// ジャーナル領域のブロック数.
    pub size: u64,

    /// メモリ上のアロケータの状態.
    pub allocator: LogSlotAllocator,

    /// 解放を待っているスロットの数.
    pub pending_erase_slots: usize,

    /// 登録中のトランザクションの数.
    pub live_transactions: usize,
}

/// 先行書き込みジャーナル.
///
/// 一つのボリューム(不揮発性メモリ)につき一つのインスタンスが存在し、
/// 複数ブロックへの書き込みを、クラッシュ整合性を保ちつつアトミックに行うための[Transaction]を提供する.
///
/// 使用前には(初回のみ)`format`で領域を初期化し、`load`でロードする必要がある.
/// ロードに成功すると、専用のコミットスレッドが起動して`Running`状態となる.
///
/// `Running`状態のインスタンスがドロップされた場合には、自動で`unload`が呼び出される.
///
/// [Transaction]: struct.Transaction.html
pub struct Journal<N: NonVolatileMemory> {
    shared: Arc<JournalShared<N>>,
    worker: Mutex<Option<JournalThreadMonitor>>,
    commit_poll_interval: Duration,
}
impl<N: NonVolatileMemory> Journal<N> {
    /// デフォルト設定で`Journal`インスタンスを生成する.
    ///
    /// 設定を変更したい場合には`JournalBuilder`を使用すること.
    pub fn new(nvm: N) -> Self {
        JournalBuilder::new().build(nvm)
    }

    pub(crate) fn with_builder(builder: &JournalBuilder, nvm: N) -> Self {
        let block_size = nvm.block_size();
        let metrics = JournalMetrics::new(&builder.metrics);
        let shared = JournalShared {
            nvm,
            block_size,
            logger: builder.logger.clone(),
            metrics,
            state: RwLock::new(JournalState {
                status: JournalStatus::New,
                start: 0,
                size: 0,
                transactions: HashMap::new(),
            }),
            log: Mutex::new(LogState {
                allocator: LogSlotAllocator::default(),
                pending_erase: HashSet::new(),
            }),
            persisted: Mutex::new(None),
            apply_lock: Mutex::new(()),
            batch_lock: Mutex::new(()),
            command_tx: Mutex::new(None),
        };
        Journal {
            shared: Arc::new(shared),
            worker: Mutex::new(None),
            commit_poll_interval: builder.commit_poll_interval,
        }
    }

    /// デバイスの`start`ブロック目から`size`ブロック分をジャーナル領域として初期化する.
    ///
    /// 空の状態のヘッダがバリア付きで書き込まれる.
    /// ジャーナルを使用するためには、この後に`load`を呼び出す必要がある.
    ///
    /// # Errors
    ///
    /// - `New`ないし`Stopped`状態ではない場合には`ErrorKind::InvalidState`
    /// - `size <= 1`の場合には`ErrorKind::InvalidInput`
    /// - ブロックサイズが`MIN_BLOCK_SIZE`未満の場合には`ErrorKind::BadSize`
    /// - 領域がデバイスに収まらない場合には`ErrorKind::Overflow`
    pub fn format(&self, start: u64, size: u64) -> Result<()> {
        let mut state = track!(self.shared.state.write().map_err(Error::from))?;
        track_assert!(
            state.status == JournalStatus::New || state.status == JournalStatus::Stopped,
            ErrorKind::InvalidState; state.status
        );
        track_assert!(size > 1, ErrorKind::InvalidInput; size);
        track!(self.shared.check_block_size())?;
        track_assert!(
            self.shared.region_fits(start, size),
            ErrorKind::Overflow,
            "journal region does not fit in the device: start={}, size={}, capacity={}",
            start,
            size,
            self.shared.nvm.capacity()
        );

        let header = JournalHeader::new(size);
        track!(self.shared.write_header(start, header))?;
        {
            let mut log = track!(self.shared.log.lock().map_err(Error::from))?;
            log.allocator = track!(header.to_allocator())?;
            log.pending_erase.clear();
            self.shared.metrics.set_allocator_state(&log.allocator);
        }
        state.status = JournalStatus::New;
        state.start = start;
        state.size = size;
        info!(self.shared.logger, "Journal formatted";
              "start" => start, "size" => size, "block_size" => self.shared.block_size.as_u16());
        Ok(())
    }

    /// デバイスの`start`ブロック目に存在するジャーナルをロードする.
    ///
    /// ヘッダの検証とアロケータの状態の復元を行った後に、
    /// ログに残っているコミット済みトランザクション群を再適用し(`Replaying`)、
    /// コミットスレッドを起動して`Running`状態となる.
    ///
    /// 失敗した場合には`New`状態に戻る.
    ///
    /// # Errors
    ///
    /// - `New`ないし`Stopped`状態ではない場合には`ErrorKind::InvalidState`
    /// - マジックナンバーが不正な場合には`ErrorKind::BadMagic`
    /// - ヘッダのチェックサムが不一致の場合には`ErrorKind::DataCorrupt`
    /// - サイズが不正ないしデバイスに収まらない場合には`ErrorKind::BadSize`
    /// - アロケータの状態が不整合な場合や、リプレイ中に不整合が検出された場合には`ErrorKind::DataCorrupt`
    pub fn load(&self, start: u64) -> Result<()> {
        {
            let mut state = track!(self.shared.state.write().map_err(Error::from))?;
            track_assert!(
                state.status == JournalStatus::New || state.status == JournalStatus::Stopped,
                ErrorKind::InvalidState; state.status
            );
            track!(self.shared.check_block_size())?;
            let header = track!(self.shared.read_header_at(start))?;
            track_assert!(
                self.shared.region_fits(start, header.size),
                ErrorKind::BadSize,
                "journal region does not fit in the device: start={}, size={}, capacity={}",
                start,
                header.size,
                self.shared.nvm.capacity()
            );
            let allocator = track!(header.to_allocator())?;
            {
                let mut log = track!(self.shared.log.lock().map_err(Error::from))?;
                log.allocator = allocator;
                log.pending_erase.clear();
                self.shared.metrics.set_allocator_state(&log.allocator);
            }
            *track!(self.shared.persisted.lock().map_err(Error::from))? = Some(header);
            state.status = JournalStatus::Replaying;
            state.start = start;
            state.size = header.size;
            state.transactions.clear();
            info!(self.shared.logger, "Loading journal";
                  "start" => start, "size" => header.size, "log_size" => header.log_size);
        }

        let result = track!(self.replay_and_spawn(start));
        let mut state = track!(self.shared.state.write().map_err(Error::from))?;
        match result {
            Ok(()) => {
                state.status = JournalStatus::Running;
                Ok(())
            }
            Err(e) => {
                error!(self.shared.logger, "Cannot load journal"; "start" => start, "error" => %e);
                state.status = JournalStatus::New;
                Err(e)
            }
        }
    }

    fn replay_and_spawn(&self, start: u64) -> Result<()> {
        let logger = self.shared.logger.new(o!("journal_start" => start));
        let summary = track!(replay(&self.shared, start, &logger))?;
        info!(logger, "Journal replayed";
              "transactions" => summary.transactions,
              "reclaimed_slots" => summary.reclaimed_slots,
              "discarded_slots" => summary.discarded_slots);
        track!(self.shared.flush(false))?;

        let (command_tx, monitor) =
            JournalThread::spawn(self.shared.clone(), start, self.commit_poll_interval);
        *track!(self.shared.command_tx.lock().map_err(Error::from))? = Some(command_tx);
        *track!(self.worker.lock().map_err(Error::from))? = Some(monitor);
        Ok(())
    }

    /// 新しいトランザクションを開始する.
    ///
    /// ジャーナルが`Running`状態ではない場合には`None`が返される.
    pub fn begin_tx(&self) -> Option<Transaction<N>> {
        let mut state = self.shared.state.write().ok()?;
        if state.status != JournalStatus::Running {
            return None;
        }
        let tx = Arc::new(TransactionShared::new(TransactionId::new()));
        state.transactions.insert(tx.id(), tx.clone());
        self.shared.metrics.begun_transactions.increment();
        debug!(self.shared.logger, "Transaction begun"; "tx" => %tx.id());
        Some(Transaction::new(tx, self.shared.clone()))
    }

    /// ジャーナルを停止する.
    ///
    /// コミットスレッドを(受信済みの要求を処理させた上で)停止し、
    /// 未処理のコミット要求を`ErrorKind::Cancelled`で終了させた後に、
    /// ログスロットの解放とヘッダの永続化を行い、`Stopped`状態となる.
    ///
    /// 既に`Stopped`状態の場合には何も行わない.
    ///
    /// # Errors
    ///
    /// `Running`ないし`Stopped`状態ではない場合には、種類が`ErrorKind::InvalidState`のエラーが返される.
    pub fn unload(&self) -> Result<()> {
        {
            let mut state = track!(self.shared.state.write().map_err(Error::from))?;
            match state.status {
                JournalStatus::Stopped => return Ok(()),
                JournalStatus::Running => {}
                status => track_panic!(ErrorKind::InvalidState, "Cannot unload: {:?}", status),
            }
            state.status = JournalStatus::Stopping;
        }
        info!(self.shared.logger, "Unloading journal");

        if let Some(command_tx) = track!(self.shared.command_tx.lock().map_err(Error::from))?.take() {
            let _ = command_tx.send(Command::Stop);
        }
        let worker = track!(self.worker.lock().map_err(Error::from))?.take();
        let worker_result = worker.map_or(Ok(()), |monitor| track!(monitor.wait()));

        let transactions = {
            let mut state = track!(self.shared.state.write().map_err(Error::from))?;
            state.transactions.drain().map(|(_, tx)| tx).collect::<Vec<_>>()
        };
        for tx in transactions {
            let mut inner = track!(tx.lock())?;
            if inner.state == TransactionState::Committing && !inner.in_batch {
                inner.state = TransactionState::Canceled;
                let e: Error = ErrorKind::Cancelled.cause("journal unloaded").into();
                inner.reply(Err(track!(e)));
                self.shared.metrics.cancelled_transactions.increment();
            }
        }

        let flush_result = track!(self.shared.flush(true));
        let mut state = track!(self.shared.state.write().map_err(Error::from))?;
        state.status = JournalStatus::Stopped;
        info!(self.shared.logger, "Journal unloaded");
        worker_result.and(flush_result)
    }

    /// 解放可能なログスロットを解放した上で、現在のアロケータの状態をヘッダとして永続化する.
    pub fn flush(&self) -> Result<()> {
        track!(self.shared.flush(true))
    }

    /// ジャーナルの状態を返す.
    pub fn status(&self) -> JournalStatus {
        self.shared
            .state
            .read()
            .map(|state| state.status)
            .unwrap_or(JournalStatus::Stopped)
    }

    /// ジャーナルの内部状態のスナップショットを返す.
    pub fn snapshot(&self) -> Result<JournalSnapshot> {
        let state = track!(self.shared.state.read().map_err(Error::from))?;
        let log = track!(self.shared.log.lock().map_err(Error::from))?;
        Ok(JournalSnapshot {
            status: state.status,
            start: state.start,
            size: state.size,
            allocator: log.allocator,
            pending_erase_slots: log.pending_erase.len(),
            live_transactions: state.transactions.len(),
        })
    }

    /// デバイス上のヘッダを読み込んで返す.
    ///
    /// # Errors
    ///
    /// ヘッダの検証に失敗した場合には、`load`と同様のエラーが返される.
    pub fn read_header(&self) -> Result<JournalHeader> {
        let start = self.start();
        track!(self.shared.read_header_at(start))
    }

    /// ジャーナルのメトリクスを返す.
    pub fn metrics(&self) -> &JournalMetrics {
        &self.shared.metrics
    }

    /// ジャーナル領域の開始ブロックを返す.
    pub fn start(&self) -> u64 {
        self.shared.state.read().map(|s| s.start).unwrap_or(0)
    }

    /// ジャーナル領域のブロック数を返す.
    pub fn size(&self) -> u64 {
        self.shared.state.read().map(|s| s.size).unwrap_or(0)
    }

    /// ブロックサイズを返す.
    pub fn block_size(&self) -> usize {
        self.shared.block_size.as_usize()
    }

    /// ジャーナルが使用している不揮発性メモリへの参照を返す.
    pub fn nvm(&self) -> &N {
        &self.shared.nvm
    }
}
impl<N: NonVolatileMemory> fmt::Debug for Journal<N> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Journal {{ status: {:?}, start: {}, size: {}, block_size: {} }}",
            self.status(),
            self.start(),
            self.size(),
            self.block_size()
        )
    }
}
impl<N: NonVolatileMemory> Drop for Journal<N> {
    fn drop(&mut self) {
        if self.status() == JournalStatus::Running {
            if let Err(e) = self.unload() {
                warn!(self.shared.logger, "Cannot unload journal"; "error" => %e);
            }
        }
    }
}

#[derive(Debug)]
struct JournalState {
    status: JournalStatus,
    start: u64,
    size: u64,
    transactions: HashMap<TransactionId, Arc<TransactionShared>>,
}

#[derive(Debug)]
struct LogState {
    allocator: LogSlotAllocator,

    /// 適用が完了し、先頭に到達次第解放されるスロット群.
    pending_erase: HashSet<u64>,
}

/// `Journal`と`Transaction`群、およびコミットスレッドの間で共有される部分.
pub(crate) struct JournalShared<N> {
    nvm: N,
    block_size: BlockSize,
    logger: Logger,
    metrics: JournalMetrics,
    state: RwLock<JournalState>,
    log: Mutex<LogState>,

    /// 最後に永続化したヘッダ.
    ///
    /// ヘッダ書き込みの直列化にも使われる.
    persisted: Mutex<Option<JournalHeader>>,

    /// データの最終位置への適用(read-modify-write)を直列化するためのロック.
    apply_lock: Mutex<()>,

    /// コミットバッチの処理とヘッダの永続化を直列化するためのロック.
    ///
    /// バッチの処理中は、そのバッチ用に割り当てたスロット群を含むヘッダが
    /// 他の経路から永続化されないようにする.
    batch_lock: Mutex<()>,

    command_tx: Mutex<Option<CommandSender>>,
}
impl<N: NonVolatileMemory> JournalShared<N> {
    fn check_block_size(&self) -> Result<()> {
        track_assert!(
            self.block_size.as_u16() >= MIN_BLOCK_SIZE,
            ErrorKind::BadSize,
            "too small block size: {} (min={})",
            self.block_size.as_u16(),
            MIN_BLOCK_SIZE
        );
        Ok(())
    }

    fn region_fits(&self, start: u64, size: u64) -> bool {
        start
            .checked_add(size)
            .and_then(|end| end.checked_mul(u64::from(self.block_size.as_u16())))
            .map_or(false, |end| end <= self.nvm.capacity())
    }

    fn slot_position(&self, start: u64, slot: u64) -> u64 {
        self.block_size.block_to_position(start + 1 + slot)
    }

    /// ジャーナル領域のバイト範囲と、ログスロットの総数を返す.
    fn region_and_log_capacity(&self) -> Result<(Range<u64>, u64)> {
        let state = track!(self.state.read().map_err(Error::from))?;
        let region = Range {
            start: self.block_size.block_to_position(state.start),
            end: self.block_size.block_to_position(state.start + state.size),
        };
        Ok((region, state.size.saturating_sub(1)))
    }

    fn read_header_at(&self, start: u64) -> Result<JournalHeader> {
        let mut page = self.nvm.create_zeroed_page();
        let position = track_assert_some!(
            start.checked_mul(u64::from(self.block_size.as_u16())),
            ErrorKind::BadSize; start
        );
        track!(self.nvm.read(&mut page, position))?;
        track!(JournalHeader::from_page(&page))
    }

    fn write_header(&self, start: u64, header: JournalHeader) -> Result<()> {
        let mut persisted = track!(self.persisted.lock().map_err(Error::from))?;
        let page = track!(header.to_page(self.block_size))?;
        let position = self.block_size.block_to_position(start);
        track!(self.nvm.write(&page, position, WriteFlags::BARRIER_DURABLE))?;
        *persisted = Some(header);
        self.metrics.header_flushes.increment();
        Ok(())
    }

    fn current_header(&self) -> Result<(u64, JournalHeader)> {
        let (start, size) = {
            let state = track!(self.state.read().map_err(Error::from))?;
            (state.start, state.size)
        };
        let log = track!(self.log.lock().map_err(Error::from))?;
        Ok((start, JournalHeader::with_allocator(size, &log.allocator)))
    }

    /// メモリ上のアロケータの状態が、永続化済みのものと異なるかどうか.
    fn is_header_dirty(&self) -> Result<bool> {
        let (_, current) = track!(self.current_header())?;
        let persisted = track!(self.persisted.lock().map_err(Error::from))?;
        Ok(*persisted != Some(current))
    }

    /// 現在のアロケータの状態を、ヘッダとしてバリア付きで永続化する.
    fn flush_header(&self) -> Result<()> {
        let (start, header) = track!(self.current_header())?;
        track!(self.write_header(start, header))
    }

    fn lock_batch(&self) -> Result<MutexGuard<()>> {
        track!(self.batch_lock.lock().map_err(Error::from))
    }

    /// 解放可能なスロット群を解放した上で、ヘッダを永続化する.
    ///
    /// 進行中のコミットバッチが存在する場合には、その完了(ないし巻き戻し)を待ってから行われる.
    /// `force`が`false`の場合には、永続化済みのヘッダと差異がある時のみ書き込む.
    fn flush(&self, force: bool) -> Result<()> {
        let _batch = track!(self.lock_batch())?;
        track!(self.compact())?;
        if force || track!(self.is_header_dirty())? {
            track!(self.flush_header())?;
        }
        Ok(())
    }

    fn start_commit_tx(&self, tx: &Arc<TransactionShared>) -> Result<()> {
        let state = track!(self.state.read().map_err(Error::from))?;
        track_assert_eq!(state.status, JournalStatus::Running, ErrorKind::InvalidState);
        track_assert!(
            state.transactions.contains_key(&tx.id()),
            ErrorKind::NotFound,
            "unknown transaction: {}",
            tx.id()
        );

        let command_tx = track!(self.command_tx.lock().map_err(Error::from))?;
        let command_tx = track_assert_some!(command_tx.as_ref(), ErrorKind::InvalidState);
        track_assert!(
            command_tx.send(Command::Commit(tx.clone())).is_ok(),
            ErrorKind::InvalidState,
            "commit thread has terminated"
        );
        Ok(())
    }

    fn unregister(&self, id: TransactionId) {
        if let Ok(mut state) = self.state.write() {
            state.transactions.remove(&id);
        }
    }

    fn allocate_slot(&self) -> Result<u64> {
        let mut log = track!(self.log.lock().map_err(Error::from))?;
        let slot = track!(log.allocator.allocate())?;
        self.metrics.set_allocator_state(&log.allocator);
        Ok(slot)
    }

    fn rewind_slots(&self, count: u64) -> Result<()> {
        let mut log = track!(self.log.lock().map_err(Error::from))?;
        track!(log.allocator.rewind(count))?;
        self.metrics.set_allocator_state(&log.allocator);
        Ok(())
    }

    fn in_use_slots(&self) -> Result<Vec<u64>> {
        let log = track!(self.log.lock().map_err(Error::from))?;
        Ok(log.allocator.in_use().collect())
    }

    fn reclaim_slot(&self, slot: u64) -> Result<()> {
        let mut log = track!(self.log.lock().map_err(Error::from))?;
        track!(log.allocator.reclaim(slot))?;
        self.metrics.reclaimed_slots.increment();
        self.metrics.set_allocator_state(&log.allocator);
        Ok(())
    }

    /// 使用中のスロットを全て未使用に戻し、その数を返す.
    fn discard_in_use_slots(&self) -> Result<u64> {
        let mut log = track!(self.log.lock().map_err(Error::from))?;
        let count = log.allocator.size();
        track!(log.allocator.rewind(count))?;
        self.metrics.set_allocator_state(&log.allocator);
        Ok(count)
    }

    /// データレコード群の内容を、それぞれの最終位置に書き込む.
    ///
    /// ブロック境界に揃っていない部分は、既存の内容を読み込んだ上で上書きされる.
    /// `durable`が指定された場合には、全ての書き込みの後にデバイスを同期する.
    fn apply_records(&self, records: &[DataRecord], durable: bool) -> Result<()> {
        let _guard = track!(self.apply_lock.lock().map_err(Error::from))?;
        let block_size = self.block_size.as_usize();
        let mut page = self.nvm.create_zeroed_page();
        for record in records {
            let mut position = record.position;
            let mut remaining = &record.data[..];
            while !remaining.is_empty() {
                let block_position = self.block_size.floor_align(position);
                let offset = (position - block_position) as usize;
                let len = remaining.len().min(block_size - offset);
                if offset != 0 || len != block_size {
                    track!(self.nvm.read(&mut page, block_position))?;
                }
                track!(page.write_at(offset, &remaining[..len]))?;
                track!(self.nvm.write(&page, block_position, WriteFlags::PLAIN))?;

                position += len as u64;
                remaining = &remaining[len..];
            }
        }
        if durable {
            track!(self.nvm.sync())?;
        }
        Ok(())
    }

    /// 適用が完了したスロット群の解放を依頼する.
    fn erase_slots(&self, slots: &[u64]) -> Result<()> {
        {
            let mut log = track!(self.log.lock().map_err(Error::from))?;
            log.pending_erase.extend(slots.iter().cloned());
        }
        track!(self.compact())?;
        Ok(())
    }

    /// 先頭から連続して解放可能なスロット群を解放し、その数を返す.
    fn compact(&self) -> Result<u64> {
        let mut guard = track!(self.log.lock().map_err(Error::from))?;
        let log = &mut *guard;
        let reclaimed = log.allocator.reclaim_set(&mut log.pending_erase);
        if reclaimed > 0 {
            self.metrics.reclaimed_slots.add_u64(reclaimed);
            self.metrics.set_allocator_state(&log.allocator);
        }
        Ok(reclaimed)
    }
}
