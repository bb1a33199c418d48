//! Block Journal.
//!
//! `blkjournal`は、生のブロックデバイス上で、複数ブロックへの書き込みを
//! クラッシュ整合性を保ちつつアトミックに行うための、先行書き込みジャーナル(WAL)およびトランザクションエンジン.
//!
//! # 特徴
//!
//! - 一つのボリュームにつき一つの[Journal]が存在し、デバイス上の連続したブロック群をログ領域として予約する
//!   - 先頭の一ブロックが[ヘッダ][JournalHeader]、残りがレコード用の"スロット"
//!   - スロット群は循環的に割り当て・解放される([LogSlotAllocator])
//! - 利用者は[Transaction]に書き込みを蓄積し、`commit`でそれらをまとめて永続化する
//!   - コミット要求は専用のバックグラウンドスレッドでバッチ化され、
//!     レコード群の書き込み後に、一回のバリア付き(durable)ヘッダ書き込みで確定する
//!   - 確定後に、各トランザクションが自分のデータを最終位置に適用し、スロットを解放する
//! - 全てのヘッダおよびレコードは、64bitのチェックサムを保持する
//! - ロード時には、ログに残っている確定済みトランザクションが再適用(リプレイ)される
//!
//! # モジュールの依存関係
//!
//! ```text
//! journal => nvm => block
//! ```
//!
//! - [journal]モジュール:
//!   - 主に[Journal]構造体と[Transaction]構造体を提供
//!   - ログのフォーマット、コミットプロトコル、リカバリを担当する
//! - [nvm]モジュール:
//!   - ジャーナルに対してブロックデバイスを抽象化した[NonVolatileMemory]トレイトとその実装群を提供
//! - [block]モジュール:
//!   - ブロックサイズやページ(ブロックサイズ分のバッファ)を提供
//!
//! [Journal]: ./journal/struct.Journal.html
//! [JournalHeader]: ./journal/struct.JournalHeader.html
//! [LogSlotAllocator]: ./journal/struct.LogSlotAllocator.html
//! [Transaction]: ./journal/struct.Transaction.html
//! [journal]: ./journal/index.html
//! [nvm]: ./nvm/index.html
//! [block]: ./block/index.html
//! [NonVolatileMemory]: ./nvm/trait.NonVolatileMemory.html
#![warn(missing_docs)]
extern crate byteorder;
extern crate futures;
extern crate libc;
extern crate prometrics;
extern crate rand;
#[cfg(test)]
extern crate tempdir;
#[macro_use]
extern crate trackable;
extern crate twox_hash;
extern crate uuid;
#[macro_use]
extern crate slog;

pub use crate::error::{Error, ErrorKind};
pub use crate::journal::{Journal, JournalBuilder, Transaction, TransactionId, TransactionState};

macro_rules! track_io {
    ($expr:expr) => {
        $expr.map_err(|e: ::std::io::Error| track!(crate::Error::from(e)))
    };
}

pub mod block;
pub mod journal;
pub mod metrics;
pub mod nvm;

mod error;

/// crate固有の`Result`型.
pub type Result<T> = std::result::Result<T, Error>;
