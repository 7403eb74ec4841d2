//! # ehr-search
//!
//! ehr-searchは、臨床記録エンティティのためのローカル全文インデックスを
//! 管理するライブラリです。エンティティ種別ごとに Tantivy インデックスを持ち、
//! キーによる完全一致検索、フリーテキスト検索、構造化条件検索を提供します。
//!
//! ## 主な機能
//!
//! - **フィールドスキーマ**: 種別ごとのトークン化・保存ポリシー
//! - **ドキュメントコーデック**: 型付きエンティティとフィールドドキュメントの相互変換
//! - **クエリビルダー**: AND/OR 条件からのクエリ式の組み立てとエスケープ再試行
//! - **インデックスハンドル**: 単一ライター・複数リーダーのインデックス管理
//! - **検索サービス**: 種別ごとの upsert と検索操作
//!
//! ## 使用例
//!
//! ```no_run
//! use ehr_search::{Criteria, Patient, Predicates, SearchService, Settings};
//!
//! // 設定を読み込む
//! let settings = Settings::load().unwrap_or_default();
//!
//! // 患者インデックスを作成
//! let patients = SearchService::<Patient>::new(&settings, None);
//! patients.upsert(&Patient::new("42", "Maria Silva").with_cpf("12345678900"))?;
//!
//! let by_cpf = Criteria::AnyOf(vec![Predicates::new().eq("cpf", "12345678900")]);
//! assert_eq!(patients.structured_search(&by_cpf)?.len(), 1);
//! # Ok::<(), ehr_search::IndexError>(())
//! ```

pub mod codec;
pub mod config;
pub mod entity;
pub mod error;
pub mod query;
pub mod schema;
pub mod search;
pub mod storage;
pub mod types;

// Explicit exports for better API clarity
pub use codec::{DocumentDecoder, DocumentEncoder, FieldDocument};
pub use config::Settings;
pub use entity::{Code, Diagnosis, Entity, Patient, Procedure, Record, Treatment};
pub use error::{IndexError, IndexResult};
pub use query::{BuiltQuery, Criteria, Predicates, QueryBuilder, QueryExpr};
pub use schema::{FieldSchema, FieldSpec, SortOrder, Tokenization, fields_for};
pub use search::SearchService;
pub use storage::IndexHandle;
pub use types::{
    CategoryMatch, EntityKind, Hospital, HospitalDb, HospitalDirectory, UndecoratedHospitals,
};
