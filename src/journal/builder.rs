use prometrics::metrics::MetricBuilder;
use slog::{Discard, Logger};
use std::time::Duration;

use crate::journal::Journal;
use crate::nvm::NonVolatileMemory;

/// `Journal`のビルダ.
#[derive(Debug, Clone)]
pub struct JournalBuilder {
    pub(crate) metrics: MetricBuilder,
    pub(crate) commit_poll_interval: Duration,
    pub(crate) logger: Logger,
}
impl JournalBuilder {
    /// デフォルト設定で`JournalBuilder`インスタンスを生成する.
    pub fn new() -> Self {
        JournalBuilder {
            metrics: MetricBuilder::new(),
            commit_poll_interval: Duration::from_millis(10),
            logger: Logger::root(Discard, o!()),
        }
    }

    /// メトリクス用の共通設定を登録する.
    ///
    /// デフォルト値は`MetricBuilder::new()`.
    pub fn metrics(&mut self, metrics: MetricBuilder) -> &mut Self {
        self.metrics = metrics;
        self
    }

    /// コミットスレッドが新規のコミット要求を待機する最大時間を設定する.
    ///
    /// この時間内にコミット要求が届かなかった場合には、
    /// スレッドは補助タスク(ログスロットの解放と、必要に応じたヘッダの永続化)を実行する.
    ///
    /// デフォルト値は`Duration::from_millis(10)`.
    pub fn commit_poll_interval(&mut self, interval: Duration) -> &mut Self {
        self.commit_poll_interval = interval;
        self
    }

    /// ロガーを設定する.
    ///
    /// デフォルト値は`Logger::root(Discard, o!())`.
    pub fn logger(&mut self, logger: Logger) -> &mut Self {
        self.logger = logger;
        self
    }

    /// 指定された不揮発性メモリを使用する`Journal`インスタンスを生成する.
    ///
    /// 生成直後のジャーナルは`New`状態であり、
    /// 利用前に`format`(初回のみ)と`load`を呼び出す必要がある.
    pub fn build<N: NonVolatileMemory>(&self, nvm: N) -> Journal<N> {
        Journal::with_builder(self, nvm)
    }
}
impl Default for JournalBuilder {
    fn default() -> Self {
        Self::new()
    }
}
