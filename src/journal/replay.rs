use slog::Logger;

use crate::journal::record::{DataRecord, JournalRecord};
use crate::journal::transaction::{TransactionId, TransactionState};
use crate::journal::JournalShared;
use crate::nvm::NonVolatileMemory;
use crate::{ErrorKind, Result};

/// リプレイの結果.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ReplaySummary {
    /// 再適用されたトランザクションの数.
    pub transactions: u64,

    /// 再適用後に解放されたスロットの数.
    pub reclaimed_slots: u64,

    /// 途中で中断された書き込みの痕跡として破棄されたスロットの数.
    pub discarded_slots: u64,
}

/// 一つのトランザクションに属するレコード群.
#[derive(Debug)]
struct RecordGroup {
    tx_id: TransactionId,
    slots: Vec<u64>,
    data: Vec<DataRecord>,
}

/// ログに残っているトランザクション群を先頭から順に再適用する.
///
/// 最初に使用中の全てのスロットを読み込んで検証し、それが成功した場合にのみ、
/// `Begin => Data* => Commit`の形をしたレコード列を先頭から順に再適用してスロットを解放する.
///
/// チェックサムの不一致やレコード列の形の崩れは、それ以降に正常なレコードが一つも存在しない場合に限り、
/// クラッシュ時に中断された書き込みの痕跡(末尾の断片)とみなされる.
/// 末尾の断片はコミット済みとしては扱われずに破棄される.
///
/// 以下の場合には、何も適用せずに種類が`ErrorKind::DataCorrupt`のエラーを返す:
///
/// - 読み込めないレコードや形の崩れの後に、正常なレコードが存在する
/// - データレコードの通し番号が欠落している
/// - コミットレコードのデータ数や状態が不一致
/// - データレコードの書き込み範囲が、デバイスの容量を超えているかジャーナル領域と重なっている
pub(crate) fn replay<N: NonVolatileMemory>(
    journal: &JournalShared<N>,
    start: u64,
    logger: &Logger,
) -> Result<ReplaySummary> {
    let slots = track!(journal.in_use_slots())?;
    let mut records = Vec::with_capacity(slots.len());
    let mut page = journal.nvm.create_zeroed_page();
    for &slot in &slots {
        track!(journal.nvm.read(&mut page, journal.slot_position(start, slot)))?;
        records.push((slot, JournalRecord::from_page(&page)));
    }

    let (groups, tail) = track!(collect_groups(journal, &records, logger))?;

    let mut summary = ReplaySummary::default();
    for g in groups {
        track!(journal.apply_records(&g.data, true))?;
        for &slot in &g.slots {
            track!(journal.reclaim_slot(slot))?;
        }
        debug!(logger, "Transaction replayed";
               "tx" => %g.tx_id, "data_records" => g.data.len());
        summary.transactions += 1;
        summary.reclaimed_slots += g.slots.len() as u64;
        journal.metrics.replayed_transactions.increment();
    }

    // 解放されずに残っているのは末尾の断片のみ
    if tail > 0 {
        summary.discarded_slots = track!(journal.discard_in_use_slots())?;
        debug_assert_eq!(summary.discarded_slots, tail);
    }
    Ok(summary)
}

/// 読み込んだレコード列を検証し、完結したトランザクション群と末尾の断片のスロット数を返す.
fn collect_groups<N: NonVolatileMemory>(
    journal: &JournalShared<N>,
    records: &[(u64, Result<JournalRecord>)],
    logger: &Logger,
) -> Result<(Vec<RecordGroup>, u64)> {
    let (region, _) = track!(journal.region_and_log_capacity())?;
    let capacity = journal.nvm.capacity();

    let mut groups = Vec::new();
    let mut group: Option<RecordGroup> = None;
    let mut consumed = 0;
    for (i, &(slot, ref record)) in records.iter().enumerate() {
        let current = group.as_ref().map(|g| g.tx_id);
        match *record {
            Err(ref e) => {
                track!(stop_at_torn_tail(records, i, &e.to_string(), logger))?;
                break;
            }
            Ok(JournalRecord::Begin(_)) if current.is_some() => {
                track!(stop_at_torn_tail(records, i, "nested begin record", logger))?;
                break;
            }
            Ok(JournalRecord::Data(ref data)) if current != Some(data.tx_id) => {
                track!(stop_at_torn_tail(records, i, "orphan data record", logger))?;
                break;
            }
            Ok(JournalRecord::Commit(ref commit)) if current != Some(commit.tx_id) => {
                track!(stop_at_torn_tail(records, i, "orphan commit record", logger))?;
                break;
            }
            Ok(JournalRecord::Begin(tx_id)) => {
                group = Some(RecordGroup {
                    tx_id,
                    slots: vec![slot],
                    data: Vec::new(),
                });
            }
            Ok(JournalRecord::Data(ref data)) => {
                let g = track_assert_some!(group.as_mut(), ErrorKind::DataCorrupt);
                track_assert_eq!(
                    data.index as usize,
                    g.data.len(),
                    ErrorKind::DataCorrupt,
                    "non-contiguous data record index: tx={}",
                    g.tx_id
                );
                let end = track_assert_some!(data.end(), ErrorKind::DataCorrupt; data.position);
                track_assert!(
                    end <= capacity && (end <= region.start || region.end <= data.position),
                    ErrorKind::DataCorrupt,
                    "data record out of range: tx={}, range={}..{}",
                    g.tx_id,
                    data.position,
                    end
                );
                g.slots.push(slot);
                g.data.push(data.clone());
            }
            Ok(JournalRecord::Commit(ref commit)) => {
                let mut g = track_assert_some!(group.take(), ErrorKind::DataCorrupt);
                track_assert_eq!(
                    commit.state,
                    TransactionState::Committed,
                    ErrorKind::DataCorrupt,
                    "tx={}",
                    g.tx_id
                );
                track_assert_eq!(
                    commit.data_count,
                    g.data.len() as u64,
                    ErrorKind::DataCorrupt,
                    "data record count mismatch: tx={}",
                    g.tx_id
                );
                g.slots.push(slot);
                consumed += g.slots.len() as u64;
                groups.push(g);
            }
        }
    }
    if let Some(g) = group {
        warn!(logger, "Incomplete transaction at the end of the log";
              "tx" => %g.tx_id, "records" => g.slots.len());
    }
    Ok((groups, records.len() as u64 - consumed))
}

/// `records[i]`以降が末尾の断片であることを確認する.
///
/// それ以降に正常に読み込めるレコードが存在する場合には、ログの途中が壊れているとみなして
/// 種類が`ErrorKind::DataCorrupt`のエラーを返す.
fn stop_at_torn_tail(
    records: &[(u64, Result<JournalRecord>)],
    i: usize,
    reason: &str,
    logger: &Logger,
) -> Result<()> {
    let slot = records[i].0;
    let followed = records[i + 1..].iter().any(|r| r.1.is_ok());
    track_assert!(
        !followed,
        ErrorKind::DataCorrupt,
        "broken record in the middle of the log: slot={}, reason={}",
        slot,
        reason
    );
    warn!(logger, "Stop replaying at the torn tail of the log"; "slot" => slot, "reason" => reason);
    Ok(())
}
