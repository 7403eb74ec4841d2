//! エラー型定義モジュール
//!
//! このモジュールは、臨床記録インデックスエンジンで使用される
//! 構造化されたエラー型を提供します。`thiserror`クレートを使用して、
//! 呼び出し側が分岐しやすいエラー分類を実現しています。
//!
//! # 主なエラー型
//!
//! - [`IndexError`]: インデックス・検索操作に関するエラー
//!
//! デコード時の列挙値や日付の変換失敗はエラーではありません。
//! 既定値で置き換えられ、`warn` レベルでログに記録されます。
//!
//! # 使用例
//!
//! ```
//! use ehr_search::error::{IndexError, IndexResult};
//! use ehr_search::types::EntityKind;
//!
//! fn example_operation() -> IndexResult<()> {
//!     Err(IndexError::NoSuchEntity {
//!         kind: EntityKind::Patient,
//!         key: "42".to_string(),
//!     })
//! }
//!
//! assert!(example_operation().is_err());
//! ```

use crate::types::EntityKind;
use std::path::PathBuf;
use thiserror::Error;

/// インデックス操作のメインエラー型
///
/// インデックスの作成、書き込み、検索、結果のデコードで発生する
/// 各種エラーを表現します。自動リトライは行われません
/// (クエリのエスケープ再試行を除く)。
///
/// # 使用例
///
/// ```
/// use ehr_search::error::IndexError;
/// use ehr_search::types::EntityKind;
///
/// let error = IndexError::CorruptDocument {
///     kind: EntityKind::Code,
///     field: "id".to_string(),
/// };
///
/// assert_eq!(error.status_code(), "CORRUPT_DOCUMENT");
/// assert!(!error.recovery_suggestions().is_empty());
/// ```
#[derive(Error, Debug)]
pub enum IndexError {
    /// 保存済みドキュメントに必須フィールド(識別キー)が存在しない
    #[error("Stored {kind} document is missing required field '{field}'")]
    CorruptDocument { kind: EntityKind, field: String },

    /// 組み立てたクエリが、エスケープ再試行後も解析できない
    #[error("Failed to parse query '{query}': {cause}")]
    QuerySyntax { query: String, cause: String },

    /// 完全一致検索で一件も見つからない
    #[error("No {kind} found for key '{key}'")]
    NoSuchEntity { kind: EntityKind, key: String },

    /// インデックスディレクトリまたは書き込みロックを取得できない
    #[error("Index storage at '{path}' is unavailable: {cause}")]
    StorageUnavailable { path: PathBuf, cause: String },

    /// Tantivy固有のエラー
    #[error("Tantivy operation failed during {operation}: {cause}")]
    Tantivy { operation: String, cause: String },

    /// 設定エラー - 無効な設定
    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    /// Mutexポイズンエラー - 別スレッドでのパニックによる
    #[error("Internal mutex was poisoned, likely due to panic in another thread")]
    MutexPoisoned,
}

impl IndexError {
    /// このエラー型の安定したステータスコードを取得します
    ///
    /// # 使用例
    ///
    /// ```
    /// use ehr_search::error::IndexError;
    ///
    /// let error = IndexError::Config {
    ///     reason: "無効な設定".to_string()
    /// };
    /// assert_eq!(error.status_code(), "CONFIG_ERROR");
    /// ```
    pub fn status_code(&self) -> String {
        match self {
            Self::CorruptDocument { .. } => "CORRUPT_DOCUMENT",
            Self::QuerySyntax { .. } => "QUERY_SYNTAX_ERROR",
            Self::NoSuchEntity { .. } => "NO_SUCH_ENTITY",
            Self::StorageUnavailable { .. } => "STORAGE_UNAVAILABLE",
            Self::Tantivy { .. } => "TANTIVY_ERROR",
            Self::Config { .. } => "CONFIG_ERROR",
            Self::MutexPoisoned => "MUTEX_POISONED",
        }
        .to_string()
    }

    /// このエラーのリカバリ提案を取得します
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::CorruptDocument { .. } => vec![
                "Re-index the affected entity so its identity key is stored again",
                "Check whether another process wrote into the index directory",
            ],
            Self::QuerySyntax { .. } => vec![
                "Remove query operators or unbalanced quotes from the search input",
            ],
            Self::NoSuchEntity { .. } => vec![
                "Check the key for blanks before calling lookup",
                "Make sure the entity was upserted into this index",
            ],
            Self::StorageUnavailable { .. } => vec![
                "Check disk space and permissions in the index directory",
                "Make sure no other process holds the writer lock",
            ],
            Self::Tantivy { .. } => vec![
                "Delete the index directory and re-index from the system of record",
            ],
            Self::MutexPoisoned => vec!["Restart the application to clear the poisoned state"],
            Self::Config { .. } => vec![],
        }
    }

    /// Tantivyエラーを操作名付きで包みます
    pub(crate) fn tantivy(operation: &str, err: impl std::fmt::Display) -> Self {
        Self::Tantivy {
            operation: operation.to_string(),
            cause: err.to_string(),
        }
    }
}

/// インデックス操作用の Result 型エイリアス
pub type IndexResult<T> = Result<T, IndexError>;

/// エラーにパス情報を追加するためのヘルパートレイト
///
/// ファイルシステムやTantivyのエラーを
/// [`IndexError::StorageUnavailable`] に変換します。
pub trait StorageContext<T> {
    /// エラーにインデックスディレクトリのパスを追加します
    fn storage_at(self, path: &std::path::Path) -> Result<T, IndexError>;
}

impl<T, E> StorageContext<T> for Result<T, E>
where
    E: std::fmt::Display,
{
    fn storage_at(self, path: &std::path::Path) -> Result<T, IndexError> {
        self.map_err(|e| IndexError::StorageUnavailable {
            path: path.to_path_buf(),
            cause: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_are_distinct() {
        let errors = [
            IndexError::CorruptDocument {
                kind: EntityKind::Patient,
                field: "id".to_string(),
            },
            IndexError::QuerySyntax {
                query: "(".to_string(),
                cause: "unbalanced".to_string(),
            },
            IndexError::NoSuchEntity {
                kind: EntityKind::Patient,
                key: "1".to_string(),
            },
            IndexError::StorageUnavailable {
                path: PathBuf::from("/tmp/x"),
                cause: "denied".to_string(),
            },
            IndexError::tantivy("commit", "boom"),
            IndexError::Config {
                reason: "bad".to_string(),
            },
            IndexError::MutexPoisoned,
        ];

        let mut codes: Vec<String> = errors.iter().map(|e| e.status_code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_storage_context_keeps_path() {
        let result: Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        let err = result.storage_at(std::path::Path::new("/srv/index")).unwrap_err();
        match err {
            IndexError::StorageUnavailable { path, cause } => {
                assert_eq!(path, PathBuf::from("/srv/index"));
                assert!(cause.contains("denied"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_display_mentions_kind() {
        let err = IndexError::NoSuchEntity {
            kind: EntityKind::Treatment,
            key: "T-1".to_string(),
        };
        assert_eq!(err.to_string(), "No treatment found for key 'T-1'");
    }
}
