//! 基本型定義モジュール
//!
//! このモジュールは、エンジン全体で使用される基本的な型を定義します。
//! エンティティ種別、病院カテゴリ、病院参照データなどが含まれます。
//!
//! # 使用例
//!
//! ```
//! use ehr_search::types::{EntityKind, HospitalDb, CategoryMatch};
//!
//! // エンティティ種別
//! let kind = EntityKind::Patient;
//! assert_eq!(kind.dir_name(), "patient");
//!
//! // 寛容なカテゴリ解析
//! let parsed = HospitalDb::parse_lenient("desconhecido");
//! assert_eq!(parsed.value(), HospitalDb::Sumario);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// インデックス対象のエンティティ種別
///
/// 種別ごとに独立したインデックスディレクトリとフィールドスキーマを持ちます。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// 患者
    Patient,
    /// 疾病分類コード (CID)
    Code,
    /// 診断 (DEF)
    Diagnosis,
    /// 処置 (TUSS)
    Procedure,
    /// 治療
    Treatment,
    /// 患者に埋め込まれた臨床記録
    Record,
}

impl EntityKind {
    /// すべての種別
    pub const ALL: [EntityKind; 6] = [
        EntityKind::Patient,
        EntityKind::Code,
        EntityKind::Diagnosis,
        EntityKind::Procedure,
        EntityKind::Treatment,
        EntityKind::Record,
    ];

    /// インデックスルート配下のディレクトリ名
    pub fn dir_name(&self) -> &'static str {
        match self {
            EntityKind::Patient => "patient",
            EntityKind::Code => "cid",
            EntityKind::Diagnosis => "def",
            EntityKind::Procedure => "tuss",
            EntityKind::Treatment => "treatment",
            EntityKind::Record => "record",
        }
    }

    /// upsert時に同一キーの既存ドキュメントを削除するかどうか
    ///
    /// 治療と記録は同じキーを複数持てるため、削除を行いません。
    pub fn replaces_on_upsert(&self) -> bool {
        !matches!(self, EntityKind::Treatment | EntityKind::Record)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Patient => "patient",
            EntityKind::Code => "code",
            EntityKind::Diagnosis => "diagnosis",
            EntityKind::Procedure => "procedure",
            EntityKind::Treatment => "treatment",
            EntityKind::Record => "record",
        };
        f.write_str(name)
    }
}

/// 寛容な解析の結果
///
/// 既知の値として解析できた場合は `Known`、できなかった場合は
/// 元の文字列と代替値を保持する `Unknown` になります。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryMatch<C> {
    Known(C),
    Unknown { raw: String, fallback: C },
}

impl<C: Copy> CategoryMatch<C> {
    /// 解析結果 (または代替値) を取得します
    pub fn value(&self) -> C {
        match self {
            CategoryMatch::Known(c) => *c,
            CategoryMatch::Unknown { fallback, .. } => *fallback,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, CategoryMatch::Known(_))
    }
}

/// 患者が属する病院データベース
///
/// 保存値が解析できない場合の既定値は [`HospitalDb::Sumario`] です。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HospitalDb {
    /// 統合サマリー
    #[default]
    Sumario,
    /// Hospital Universitário Antônio Pedro
    Huap,
    /// Hospital Universitário Pedro Ernesto
    Hupe,
    /// Hospital Universitário Clementino Fraga Filho
    Hucff,
}

impl HospitalDb {
    /// 正規の文字列キー
    pub fn as_key(&self) -> &'static str {
        match self {
            HospitalDb::Sumario => "sumario",
            HospitalDb::Huap => "huap",
            HospitalDb::Hupe => "hupe",
            HospitalDb::Hucff => "hucff",
        }
    }

    /// Parse from string, substituting the default category for unknown values
    pub fn parse_lenient(s: &str) -> CategoryMatch<Self> {
        match s.parse() {
            Ok(db) => CategoryMatch::Known(db),
            Err(_) => CategoryMatch::Unknown {
                raw: s.to_string(),
                fallback: HospitalDb::default(),
            },
        }
    }
}

impl FromStr for HospitalDb {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sumario" => Ok(HospitalDb::Sumario),
            "huap" => Ok(HospitalDb::Huap),
            "hupe" => Ok(HospitalDb::Hupe),
            "hucff" => Ok(HospitalDb::Hucff),
            _ => Err("Unknown hospital database"),
        }
    }
}

impl fmt::Display for HospitalDb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_key())
    }
}

/// 病院参照データ
///
/// インデックスにはキーのみが保存され、デコード時に
/// [`HospitalDirectory`] で装飾されます。
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Hospital {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Hospital {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: None,
        }
    }
}

/// 病院参照データの検索機能
///
/// 記録と治療のデコード時にのみ参照されます。
pub trait HospitalDirectory: Send + Sync {
    fn hospital(&self, key: &str) -> Option<Hospital>;
}

/// 装飾を行わない既定のディレクトリ
#[derive(Debug, Default, Clone, Copy)]
pub struct UndecoratedHospitals;

impl HospitalDirectory for UndecoratedHospitals {
    fn hospital(&self, key: &str) -> Option<Hospital> {
        Some(Hospital::new(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_dir_names_are_unique() {
        let mut names: Vec<&str> = EntityKind::ALL.iter().map(|k| k.dir_name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), EntityKind::ALL.len());
    }

    #[test]
    fn test_replace_semantics() {
        assert!(EntityKind::Patient.replaces_on_upsert());
        assert!(EntityKind::Code.replaces_on_upsert());
        assert!(EntityKind::Diagnosis.replaces_on_upsert());
        assert!(EntityKind::Procedure.replaces_on_upsert());
        assert!(!EntityKind::Treatment.replaces_on_upsert());
        assert!(!EntityKind::Record.replaces_on_upsert());
    }

    #[test]
    fn test_hospital_db_parse_is_case_insensitive() {
        assert_eq!("HUPE".parse::<HospitalDb>(), Ok(HospitalDb::Hupe));
        assert_eq!(" huap ".parse::<HospitalDb>(), Ok(HospitalDb::Huap));
        assert!("nowhere".parse::<HospitalDb>().is_err());
    }

    #[test]
    fn test_lenient_parse_falls_back_to_sumario() {
        let parsed = HospitalDb::parse_lenient("garbage");
        assert!(!parsed.is_known());
        assert_eq!(parsed.value(), HospitalDb::Sumario);
        match parsed {
            CategoryMatch::Unknown { raw, .. } => assert_eq!(raw, "garbage"),
            CategoryMatch::Known(_) => panic!("expected unknown"),
        }

        let parsed = HospitalDb::parse_lenient("hucff");
        assert_eq!(parsed, CategoryMatch::Known(HospitalDb::Hucff));
    }

    #[test]
    fn test_undecorated_directory_echoes_key() {
        let hospital = UndecoratedHospitals.hospital("H1").unwrap();
        assert_eq!(hospital, Hospital::new("H1"));
    }
}
