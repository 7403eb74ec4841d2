//! エンティティモジュール
//!
//! インデックス対象の型付きエンティティと、それぞれのフィールドドキュメントへの
//! 変換を定義します。変換規則はすべて [`crate::schema`] の表に従います。
//!
//! # 主要なコンポーネント
//!
//! - [`Entity`]: エンコード・デコード・識別述語を提供するトレイト
//! - [`Patient`], [`Code`], [`Diagnosis`], [`Procedure`], [`Treatment`], [`Record`]

mod code;
mod patient;
mod record;
mod treatment;

pub use code::{Code, Diagnosis, Procedure};
pub use patient::Patient;
pub use record::Record;
pub use treatment::Treatment;

use crate::codec::{DocumentDecoder, FieldDocument};
use crate::error::{IndexError, IndexResult};
use crate::query::Predicates;
use crate::schema::{FieldSchema, fields_for};
use crate::types::{EntityKind, Hospital, HospitalDirectory};

/// インデックスに保存できる型付きエンティティ
///
/// `Default` は空キーでの完全一致検索が返す空エンティティとして使われます。
pub trait Entity: Sized + Default + Clone + std::fmt::Debug + Send + Sync {
    /// このエンティティの種別
    const KIND: EntityKind;

    /// 種別のフィールドスキーマ
    fn schema() -> &'static FieldSchema {
        fields_for(Self::KIND)
    }

    /// 識別キー (upsert時の置換対象)
    fn key(&self) -> String;

    /// フィールドドキュメントへ変換します
    fn encode(&self) -> FieldDocument;

    /// 検索結果ドキュメントから復元します
    ///
    /// 識別キーが無い場合のみ [`IndexError::CorruptDocument`] を返します。
    fn decode(doc: &DocumentDecoder<'_>, hospitals: &dyn HospitalDirectory) -> IndexResult<Self>;

    /// 複数エンティティ検索でこのエンティティを特定する述語
    fn identity(&self) -> Predicates;
}

/// Parse a numeric identity key, treating garbage as a corrupt document
pub(crate) fn numeric_key(kind: EntityKind, field: &str, raw: &str) -> IndexResult<u32> {
    raw.trim().parse().map_err(|_| {
        tracing::warn!(%kind, field, value = raw, "identity key is not numeric");
        IndexError::CorruptDocument {
            kind,
            field: field.to_string(),
        }
    })
}

/// Decorate a stored hospital key through the directory
pub(crate) fn decorate(hospitals: &dyn HospitalDirectory, kind: EntityKind, key: &str) -> Hospital {
    if key.is_empty() {
        return Hospital::default();
    }
    hospitals.hospital(key).unwrap_or_else(|| {
        tracing::warn!(%kind, hospital = key, "hospital not found in directory, left undecorated");
        Hospital::new(key)
    })
}
