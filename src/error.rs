use std;
use trackable;
use trackable::error::ErrorKindExt;

/// crate固有のエラー型.
#[derive(Debug, Clone, TrackableError)]
pub struct Error(trackable::error::TrackableError<ErrorKind>);
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        if let Some(e) = e.get_ref().and_then(|e| e.downcast_ref::<Error>()).cloned() {
            e
        } else if e.kind() == std::io::ErrorKind::InvalidInput {
            ErrorKind::InvalidInput.cause(e).into()
        } else {
            ErrorKind::Other.cause(e).into()
        }
    }
}
impl From<Error> for std::io::Error {
    fn from(e: Error) -> Self {
        if *e.kind() == ErrorKind::InvalidInput {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, e)
        } else {
            std::io::Error::new(std::io::ErrorKind::Other, e)
        }
    }
}
impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        ErrorKind::Other.cause(e.to_string()).into()
    }
}

/// 発生し得るエラーの種別.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 入力(引数や設定値)が不正.
    ///
    /// # 典型的な対応策
    ///
    /// - 利用者側のプログラムを修正して入力を正しくする
    InvalidInput,

    /// ジャーナルないしトランザクションの状態遷移上、許可されていない操作が要求された.
    ///
    /// E.g., `Running`ではないジャーナルへのコミット要求、コミット済みトランザクションへの書き込み
    InvalidState,

    /// メモリ等のリソース確保に失敗した.
    NoMemory,

    /// 指定されたトランザクションやスロットが存在しない.
    NotFound,

    /// ジャーナルのログ領域に空きスロットが存在しない.
    ///
    /// # 典型的な対応策
    ///
    /// - 先行するトランザクション群の適用完了(スロット解放)を待ってからリトライする
    /// - トランザクションを分割する
    Exhausted,

    /// 書き込み範囲がボリュームのアドレス可能範囲を超えている.
    Overflow,

    /// 書き込み範囲がジャーナル自身の予約領域と重なっている.
    Overlap,

    /// ジャーナルヘッダのマジックナンバーが不正.
    ///
    /// 未フォーマットの領域をロードしようとした場合等に返される.
    BadMagic,

    /// ジャーナルのサイズないしブロックサイズが不正.
    BadSize,

    /// データが破損している.
    ///
    /// チェックサムの検証に失敗した場合や、
    /// ログ内のレコード列の構造が不整合な場合にこのエラーが返される.
    ///
    /// # 典型的な対応策
    ///
    /// - もし人手で復旧可能な場合には復旧する
    /// - それが無理であれば、諦めて初期化(再フォーマット)を行う
    DataCorrupt,

    /// トランザクションがコミット完了前に取り消された.
    Cancelled,

    /// その他エラー.
    ///
    /// E.g., ブロックデバイスのI/Oエラー
    ///
    /// # 典型的な対応策
    ///
    /// - 利用者側で（指数バックオフ等を挟みつつ）何度かリトライ
    ///   - それでもダメなら、致命的な異常が発生していると判断
    Other,
}
impl trackable::error::ErrorKind for ErrorKind {}

#[cfg(test)]
mod tests {
    use std::io;
    use trackable::error::ErrorKindExt;

    use super::*;

    #[test]
    fn io_error_conversion_works() {
        let e = Error::from(io::Error::new(io::ErrorKind::InvalidInput, "foo"));
        assert_eq!(*e.kind(), ErrorKind::InvalidInput);

        let e = Error::from(io::Error::new(io::ErrorKind::NotFound, "bar"));
        assert_eq!(*e.kind(), ErrorKind::Other);

        // 往復しても種別が失われない
        let original: Error = ErrorKind::DataCorrupt.cause("broken").into();
        let e = Error::from(io::Error::from(original));
        assert_eq!(*e.kind(), ErrorKind::DataCorrupt);
    }
}
