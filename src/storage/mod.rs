//! ストレージモジュール
//!
//! エンティティ種別ごとのインデックスディレクトリを Tantivy で管理します。
//!
//! # 主要なコンポーネント
//!
//! - [`IndexHandle`]: 1種別分のインデックス (作成・書き込み・検索)
//!
//! # 使用例
//!
//! ```no_run
//! use ehr_search::config::Settings;
//! use ehr_search::schema::fields_for;
//! use ehr_search::storage::IndexHandle;
//! use ehr_search::types::EntityKind;
//!
//! let settings = Settings::default();
//! let path = settings.index_dir_for(EntityKind::Patient, None);
//! let handle = IndexHandle::open(&path, fields_for(EntityKind::Patient), &settings)
//!     .expect("インデックスを開けませんでした");
//! println!("{} documents", handle.document_count());
//! ```

pub mod tantivy;
pub use tantivy::{IndexHandle, WRITER_LOCK_FILE, normalized_heap_bytes};
