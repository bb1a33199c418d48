//! [Prometheus][prometheus]用のメトリクス.
//!
//! [prometheus]: https://prometheus.io/
use prometrics::metrics::{Counter, Gauge, MetricBuilder};

use crate::journal::{JournalRecord, LogSlotAllocator};

/// ジャーナルのメトリクス.
#[derive(Debug, Clone)]
pub struct JournalMetrics {
    pub(crate) begun_transactions: Counter,
    pub(crate) committed_transactions: Counter,
    pub(crate) failed_transactions: Counter,
    pub(crate) cancelled_transactions: Counter,
    pub(crate) commit_batches: Counter,
    pub(crate) header_flushes: Counter,
    pub(crate) replayed_transactions: Counter,
    pub(crate) reclaimed_slots: Counter,
    pub(crate) log_slots_in_use: Gauge,
    pub(crate) log_slots_capacity: Gauge,
    written_records: JournalRecordCounter,
}
impl JournalMetrics {
    /// 開始されたトランザクションの数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// blkjournal_journal_begun_transactions_total <COUNTER>
    /// ```
    pub fn begun_transactions(&self) -> u64 {
        self.begun_transactions.value() as u64
    }

    /// コミットに成功したトランザクションの数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// blkjournal_journal_committed_transactions_total <COUNTER>
    /// ```
    pub fn committed_transactions(&self) -> u64 {
        self.committed_transactions.value() as u64
    }

    /// コミットバッチの失敗に巻き込まれたトランザクションの数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// blkjournal_journal_failed_transactions_total <COUNTER>
    /// ```
    pub fn failed_transactions(&self) -> u64 {
        self.failed_transactions.value() as u64
    }

    /// 取り消されたトランザクションの数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// blkjournal_journal_cancelled_transactions_total <COUNTER>
    /// ```
    pub fn cancelled_transactions(&self) -> u64 {
        self.cancelled_transactions.value() as u64
    }

    /// 処理されたコミットバッチの数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// blkjournal_journal_commit_batches_total <COUNTER>
    /// ```
    pub fn commit_batches(&self) -> u64 {
        self.commit_batches.value() as u64
    }

    /// ログスロットに書き込まれたレコードの数.
    pub fn written_records(&self) -> &JournalRecordCounter {
        &self.written_records
    }

    /// ヘッダの永続化回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// blkjournal_journal_header_flushes_total <COUNTER>
    /// ```
    pub fn header_flushes(&self) -> u64 {
        self.header_flushes.value() as u64
    }

    /// ロード時にリプレイされたトランザクションの数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// blkjournal_journal_replayed_transactions_total <COUNTER>
    /// ```
    pub fn replayed_transactions(&self) -> u64 {
        self.replayed_transactions.value() as u64
    }

    /// 解放されたログスロットの数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// blkjournal_journal_reclaimed_slots_total <COUNTER>
    /// ```
    pub fn reclaimed_slots(&self) -> u64 {
        self.reclaimed_slots.value() as u64
    }

    /// 使用中のログスロットの数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// blkjournal_journal_log_slots_in_use <GAUGE>
    /// ```
    pub fn log_slots_in_use(&self) -> u64 {
        self.log_slots_in_use.value() as u64
    }

    /// ログスロットの総数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// blkjournal_journal_log_slots_capacity <GAUGE>
    /// ```
    pub fn log_slots_capacity(&self) -> u64 {
        self.log_slots_capacity.value() as u64
    }

    pub(crate) fn set_allocator_state(&self, allocator: &LogSlotAllocator) {
        self.log_slots_in_use.set(allocator.size() as f64);
        self.log_slots_capacity.set(allocator.capacity() as f64);
    }

    pub(crate) fn count_written_record(&self, record: &JournalRecord) {
        self.written_records.increment(record);
    }

    pub(crate) fn new(builder: &MetricBuilder) -> Self {
        let mut builder = builder.clone();
        builder.namespace("blkjournal").subsystem("journal");
        JournalMetrics {
            begun_transactions: builder
                .counter("begun_transactions_total")
                .help("Number of begun transactions")
                .finish()
                .expect("Never fails"),
            committed_transactions: builder
                .counter("committed_transactions_total")
                .help("Number of durably committed transactions")
                .finish()
                .expect("Never fails"),
            failed_transactions: builder
                .counter("failed_transactions_total")
                .help("Number of transactions failed by a commit batch error")
                .finish()
                .expect("Never fails"),
            cancelled_transactions: builder
                .counter("cancelled_transactions_total")
                .help("Number of cancelled transactions")
                .finish()
                .expect("Never fails"),
            commit_batches: builder
                .counter("commit_batches_total")
                .help("Number of commit batches processed by the worker")
                .finish()
                .expect("Never fails"),
            header_flushes: builder
                .counter("header_flushes_total")
                .help("Number of barrier writes of the journal header")
                .finish()
                .expect("Never fails"),
            replayed_transactions: builder
                .counter("replayed_transactions_total")
                .help("Number of transactions replayed at load time")
                .finish()
                .expect("Never fails"),
            reclaimed_slots: builder
                .counter("reclaimed_slots_total")
                .help("Number of log slots reclaimed by compaction or replay")
                .finish()
                .expect("Never fails"),
            log_slots_in_use: builder
                .gauge("log_slots_in_use")
                .help("Number of log slots in use")
                .finish()
                .expect("Never fails"),
            log_slots_capacity: builder
                .gauge("log_slots_capacity")
                .help("Total number of log slots")
                .finish()
                .expect("Never fails"),
            written_records: JournalRecordCounter::new(
                &builder,
                "written_records_total",
                "Number of records written to the log slots",
            ),
        }
    }
}

/// ジャーナルのレコードの種別毎のカウンタ.
///
/// # Prometheus
///
/// ```prometheus
/// blkjournal_journal_written_records_total { kind="begin|data|commit" } <COUNTER>
/// ```
#[derive(Debug, Clone)]
pub struct JournalRecordCounter {
    begin: Counter,
    data: Counter,
    commit: Counter,
}
impl JournalRecordCounter {
    /// `Begin`レコードの数.
    pub fn begin(&self) -> u64 {
        self.begin.value() as u64
    }

    /// `Data`レコードの数.
    pub fn data(&self) -> u64 {
        self.data.value() as u64
    }

    /// `Commit`レコードの数.
    pub fn commit(&self) -> u64 {
        self.commit.value() as u64
    }

    /// 全種別の合計.
    pub fn sum(&self) -> u64 {
        self.begin() + self.data() + self.commit()
    }

    fn increment(&self, record: &JournalRecord) {
        match *record {
            JournalRecord::Begin(_) => self.begin.increment(),
            JournalRecord::Data(_) => self.data.increment(),
            JournalRecord::Commit(_) => self.commit.increment(),
        }
    }

    fn new(builder: &MetricBuilder, name: &str, help: &str) -> Self {
        let counter = |kind: &str| {
            builder
                .counter(name)
                .help(help)
                .label("kind", kind)
                .finish()
                .expect("Never fails")
        };
        JournalRecordCounter {
            begin: counter("begin"),
            data: counter("data"),
            commit: counter("commit"),
        }
    }
}

#[cfg(test)]
mod tests {
    use prometrics::metrics::MetricBuilder;
    use trackable::result::TestResult;

    use super::*;
    use crate::journal::{JournalRecord, LogSlotAllocator, TransactionId};

    #[test]
    fn metrics_works() -> TestResult {
        let metrics = JournalMetrics::new(&MetricBuilder::new());
        assert_eq!(metrics.begun_transactions(), 0);

        metrics.begun_transactions.increment();
        metrics.reclaimed_slots.add_u64(3);
        assert_eq!(metrics.begun_transactions(), 1);
        assert_eq!(metrics.reclaimed_slots(), 3);

        let mut allocator = track!(LogSlotAllocator::new(9))?;
        track!(allocator.allocate())?;
        metrics.set_allocator_state(&allocator);
        assert_eq!(metrics.log_slots_in_use(), 1);
        assert_eq!(metrics.log_slots_capacity(), 9);

        metrics.count_written_record(&JournalRecord::Begin(TransactionId::new()));
        metrics.count_written_record(&JournalRecord::Begin(TransactionId::new()));
        assert_eq!(metrics.written_records().begin(), 2);
        assert_eq!(metrics.written_records().sum(), 2);
        Ok(())
    }
}
