use futures::sync::oneshot;
use futures::Future;
use std::fmt;
use std::mem;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use trackable::error::ErrorKindExt;
use uuid::Uuid;

use crate::block::Page;
use crate::journal::record::{data_payload_capacity, DataRecord};
use crate::journal::JournalShared;
use crate::nvm::NonVolatileMemory;
use crate::{Error, ErrorKind, Result};

/// トランザクションの識別子 (128bit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(Uuid);
impl TransactionId {
    /// ランダムな識別子を生成する.
    pub fn new() -> Self {
        TransactionId(Uuid::new_v4())
    }

    /// バイト列から識別子を生成する.
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        TransactionId(Uuid::from_bytes(bytes))
    }

    /// 識別子のバイト列表現を返す.
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}
impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}
impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.to_simple())
    }
}
impl FromStr for TransactionId {
    type Err = Error;

    /// 16進数表記(ハイフン区切りも可)の文字列を識別子に変換する.
    fn from_str(s: &str) -> Result<Self> {
        let uuid = track!(Uuid::parse_str(s)
            .map_err(|e| Error::from(ErrorKind::InvalidInput.cause(e.to_string()))))?;
        Ok(TransactionId(uuid))
    }
}

/// トランザクションの状態.
///
/// `New => Committing => {Committed, Canceled}`の順に遷移し、
/// `Committed`と`Canceled`は終端状態となる.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionState {
    New = 0,
    Committing = 1,
    Committed = 2,
    Canceled = 3,
}
impl TransactionState {
    /// 状態を数値表現に変換する.
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// 数値表現から状態を復元する.
    ///
    /// # Errors
    ///
    /// 未知の値の場合には、種類が`ErrorKind::DataCorrupt`のエラーが返される.
    pub fn from_u32(n: u32) -> Result<Self> {
        Ok(match n {
            0 => TransactionState::New,
            1 => TransactionState::Committing,
            2 => TransactionState::Committed,
            3 => TransactionState::Canceled,
            _ => track_panic!(ErrorKind::DataCorrupt, "Unknown transaction state: {}", n),
        })
    }
}

/// トランザクションの、ジャーナル(およびそのコミットスレッド)と共有される部分.
#[derive(Debug)]
pub(crate) struct TransactionShared {
    id: TransactionId,
    inner: Mutex<TransactionInner>,
}
impl TransactionShared {
    pub fn new(id: TransactionId) -> Self {
        TransactionShared {
            id,
            inner: Mutex::new(TransactionInner {
                state: TransactionState::New,
                data: Vec::new(),
                slots: Vec::new(),
                in_batch: false,
                reply: None,
            }),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn lock(&self) -> Result<MutexGuard<TransactionInner>> {
        track!(self.inner.lock().map_err(Error::from))
    }
}

#[derive(Debug)]
pub(crate) struct TransactionInner {
    pub state: TransactionState,
    pub data: Vec<DataRecord>,

    /// コミット完了時に割り当てられていたログスロット群.
    pub slots: Vec<u64>,

    /// コミットスレッドのバッチに取り込まれたかどうか.
    ///
    /// 一度取り込まれたトランザクションは、もう取り消すことはできない.
    pub in_batch: bool,

    pub reply: Option<oneshot::Sender<Result<()>>>,
}
impl TransactionInner {
    /// `New`状態から`Committing`状態に遷移させ、コミット結果の受信口を返す.
    pub fn start_committing(&mut self) -> Result<CommitReply> {
        track_assert_eq!(self.state, TransactionState::New, ErrorKind::InvalidState);
        let (reply_tx, reply_rx) = oneshot::channel();
        self.state = TransactionState::Committing;
        self.reply = Some(reply_tx);
        Ok(reply_rx)
    }

    /// 待機者にコミットの結果を通知する.
    pub fn reply(&mut self, result: Result<()>) {
        if let Some(reply) = self.reply.take() {
            let _ = reply.send(result);
        }
    }
}

/// コミット結果の受信口.
pub(crate) type CommitReply = oneshot::Receiver<Result<()>>;

/// コミット結果が通知されるまで、呼び出し元のスレッドをブロックする.
///
/// 結果が通知されないまま送信側が破棄された場合には`ErrorKind::Cancelled`となる.
pub(crate) fn wait_reply(reply: CommitReply) -> Result<()> {
    match reply.wait() {
        Ok(result) => track!(result),
        Err(_) => track_panic!(
            ErrorKind::Cancelled,
            "commit worker terminated before replying"
        ),
    }
}

/// 原子性の単位となるトランザクション.
///
/// [`Journal::begin_tx`]で開始し、[`write`]で書き込みを蓄積した後に、
/// [`commit`]でそれらをまとめて永続化する.
///
/// コミットも取り消しも行われずに`New`状態のままドロップされた場合には、
/// 自動的に取り消される.
///
/// [`Journal::begin_tx`]: ./struct.Journal.html#method.begin_tx
/// [`write`]: #method.write
/// [`commit`]: #method.commit
pub struct Transaction<N: NonVolatileMemory> {
    shared: Arc<TransactionShared>,
    journal: Arc<JournalShared<N>>,
}
impl<N: NonVolatileMemory> Transaction<N> {
    pub(crate) fn new(shared: Arc<TransactionShared>, journal: Arc<JournalShared<N>>) -> Self {
        Transaction { shared, journal }
    }

    /// トランザクションのIDを返す.
    pub fn id(&self) -> TransactionId {
        self.shared.id()
    }

    /// トランザクションの現在の状態を返す.
    pub fn state(&self) -> Result<TransactionState> {
        Ok(track!(self.shared.lock())?.state)
    }

    /// これまでに蓄積された書き込みデータの合計バイト数を返す.
    pub fn data_len(&self) -> Result<u64> {
        let inner = track!(self.shared.lock())?;
        Ok(inner.data.iter().map(|r| r.data.len() as u64).sum())
    }

    /// `page`の内容を`position`に書き込むことを予約する.
    ///
    /// `write_bytes(page.as_bytes(), position)`と等しい.
    pub fn write(&self, page: &Page, position: u64) -> Result<()> {
        track!(self.write_bytes(page.as_bytes(), position))
    }

    /// `data`を`position`に書き込むことを予約する.
    ///
    /// データはペイロードの上限毎に分割され、それぞれが一つのデータレコードとなる.
    /// レコードの通し番号は、同じトランザクションへの全ての書き込みを通して連番で割り当てられる.
    ///
    /// 実際にデバイスに書き込まれるのは、コミットが完了した後となる.
    ///
    /// # Errors
    ///
    /// - `New`状態ではない場合には`ErrorKind::InvalidState`
    /// - `data`が空の場合には`ErrorKind::InvalidInput`
    /// - 書き込み範囲がデバイスの容量を超えている場合には`ErrorKind::Overflow`
    /// - 書き込み範囲がジャーナル領域と重なっている場合には`ErrorKind::Overlap`
    /// - レコード数がログスロットの総数を超える場合には`ErrorKind::Exhausted`
    pub fn write_bytes(&self, data: &[u8], position: u64) -> Result<()> {
        let (region, log_capacity) = track!(self.journal.region_and_log_capacity())?;

        let mut inner = track!(self.shared.lock())?;
        track_assert_eq!(inner.state, TransactionState::New, ErrorKind::InvalidState);
        track_assert!(!data.is_empty(), ErrorKind::InvalidInput, "empty write");

        let end = track_assert_some!(
            position.checked_add(data.len() as u64),
            ErrorKind::Overflow; position, data.len()
        );
        let capacity = self.journal.nvm.capacity();
        track_assert!(end <= capacity, ErrorKind::Overflow; position, end, capacity);
        track_assert!(
            end <= region.start || region.end <= position,
            ErrorKind::Overlap,
            "write range {}..{} overlaps journal region {:?}",
            position,
            end,
            region
        );

        let chunk_size = data_payload_capacity(self.journal.block_size);
        let chunks = (data.len() + chunk_size - 1) / chunk_size;
        let records = (inner.data.len() + chunks + 2) as u64;
        track_assert!(
            records <= log_capacity,
            ErrorKind::Exhausted,
            "too many records for the log: records={}, log_capacity={}",
            records,
            log_capacity
        );

        for (i, chunk) in data.chunks(chunk_size).enumerate() {
            let index = inner.data.len() as u32;
            inner.data.push(DataRecord {
                tx_id: self.shared.id(),
                position: position + (i * chunk_size) as u64,
                index,
                data: chunk.to_vec(),
            });
        }
        Ok(())
    }

    /// トランザクションをコミットする.
    ///
    /// このメソッドは、コミットレコードを含むバッチのヘッダ書き込みが永続化されるまでブロックする.
    ///
    /// コミットが完了した後には、書き込みデータを最終位置に適用して、
    /// ログスロットの解放をジャーナルに依頼する.
    /// この適用および解放での失敗はログに記録されるのみで、結果には影響しない
    /// (次回ロード時のリプレイによって再適用される).
    ///
    /// # Errors
    ///
    /// - `New`状態ではない場合には`ErrorKind::InvalidState`
    /// - ジャーナルへの登録に失敗した場合には、そのエラー (トランザクションは`Canceled`となる)
    /// - 同じバッチ内のレコード書き込みないしヘッダ書き込みに失敗した場合には、そのエラー
    /// - コミット完了前に取り消された場合には`ErrorKind::Cancelled`
    pub fn commit(&self) -> Result<()> {
        let reply = {
            let mut inner = track!(self.shared.lock())?;
            track!(inner.start_committing())?
        };

        if let Err(e) = track!(self.journal.start_commit_tx(&self.shared)) {
            if let Ok(mut inner) = self.shared.lock() {
                inner.state = TransactionState::Canceled;
                inner.reply = None;
            }
            self.journal.metrics.cancelled_transactions.increment();
            self.journal.unregister(self.id());
            return Err(e);
        }

        if let Err(e) = wait_reply(reply) {
            self.journal.unregister(self.id());
            return Err(track!(e));
        }

        let (data, slots) = {
            let mut inner = track!(self.shared.lock())?;
            debug_assert_eq!(inner.state, TransactionState::Committed);
            (
                mem::replace(&mut inner.data, Vec::new()),
                mem::replace(&mut inner.slots, Vec::new()),
            )
        };
        let logger = &self.journal.logger;
        if let Err(e) = track!(self.journal.apply_records(&data, false)) {
            warn!(logger, "Cannot apply committed data (will be replayed at next load)";
                  "tx" => %self.id(), "error" => %e);
        } else if let Err(e) = track!(self.journal.erase_slots(&slots)) {
            warn!(logger, "Cannot erase log slots"; "tx" => %self.id(), "error" => %e);
        }
        debug!(logger, "Transaction committed"; "tx" => %self.id(), "records" => data.len());
        self.journal.unregister(self.id());
        Ok(())
    }

    /// トランザクションを取り消す.
    ///
    /// コミット待機中のスレッドが存在する場合には、`ErrorKind::Cancelled`で起床させられる.
    ///
    /// # Errors
    ///
    /// 既にコミットスレッドのバッチに取り込まれている場合や、終端状態にある場合には、
    /// 種類が`ErrorKind::InvalidState`のエラーが返される.
    /// 前者の場合にはコミットの結果が優先される.
    pub fn cancel(&self) -> Result<()> {
        {
            let mut inner = track!(self.shared.lock())?;
            match inner.state {
                TransactionState::New => {}
                TransactionState::Committing if !inner.in_batch => {}
                state => track_panic!(
                    ErrorKind::InvalidState,
                    "Cannot cancel: state={:?}, in_batch={}",
                    state,
                    inner.in_batch
                ),
            }
            inner.state = TransactionState::Canceled;
            let e: Error = ErrorKind::Cancelled.cause("transaction cancelled").into();
            inner.reply(Err(track!(e)));
        }
        self.journal.metrics.cancelled_transactions.increment();
        self.journal.unregister(self.id());
        debug!(self.journal.logger, "Transaction cancelled"; "tx" => %self.id());
        Ok(())
    }
}
impl<N: NonVolatileMemory> Transaction<N> {
    #[cfg(test)]
    pub(crate) fn shared(&self) -> &Arc<TransactionShared> {
        &self.shared
    }
}
impl<N: NonVolatileMemory> fmt::Debug for Transaction<N> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Transaction {{ id: {} }}", self.id())
    }
}
impl<N: NonVolatileMemory> Drop for Transaction<N> {
    fn drop(&mut self) {
        let is_new = self
            .shared
            .lock()
            .map(|inner| inner.state == TransactionState::New)
            .unwrap_or(false);
        if is_new {
            let _ = self.cancel();
        } else {
            self.journal.unregister(self.id());
        }
    }
}
