//! 設定管理モジュール
//!
//! このモジュールは、インデックスエンジンのためのレイヤード設定システムを
//! 提供します。以下の優先順位で設定を読み込みます：
//! - デフォルト値
//! - TOML設定ファイル
//! - 環境変数によるオーバーライド
//!
//! # 環境変数
//!
//! 環境変数は `EHR_` プレフィックスを必要とし、ネストされたレベルを
//! 区切るためにダブルアンダースコアを使用します：
//! - `EHR_INDEX_ROOT=/srv/ehr/index` は `index_root` を設定
//! - `EHR_INDEXING__TANTIVY_HEAP_MB=100` は `indexing.tantivy_heap_mb` を設定
//! - `EHR_SEARCH__FREE_TEXT_LIMIT=20` は `search.free_text_limit` を設定
//!
//! # 使用例
//!
//! ```no_run
//! use ehr_search::config::Settings;
//!
//! // デフォルト設定を読み込む
//! let settings = Settings::default();
//!
//! // 特定のパスから設定を読み込む
//! let settings = Settings::load_from("/etc/ehr/settings.toml")
//!     .expect("設定の読み込みに失敗しました");
//! ```

use crate::types::EntityKind;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// ホスト側の既定パスが無い場合に使われるインデックスルート
pub const FALLBACK_INDEX_ROOT: &str = ".ehr_index";

/// 設定ファイルの既定の場所
pub const DEFAULT_CONFIG_FILE: &str = "ehr-search.toml";

/// メイン設定構造体
///
/// # フィールド
///
/// * `version` - 設定スキーマのバージョン
/// * `index_root` - ホスト側から与えられる既定のインデックスルート
/// * `indexing` - インデックス書き込み設定
/// * `search` - 検索設定
///
/// # 使用例
///
/// ```
/// use ehr_search::config::Settings;
///
/// let settings = Settings::default();
/// assert_eq!(settings.search.free_text_limit, 10);
/// ```
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// 設定スキーマのバージョン
    #[serde(default = "default_version")]
    pub version: u32,

    /// 種別ごとのディレクトリを置くルート
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_root: Option<PathBuf>,

    /// インデックス書き込み設定
    #[serde(default)]
    pub indexing: IndexingConfig,

    /// 検索設定
    #[serde(default)]
    pub search: SearchConfig,
}

/// インデックス書き込み設定
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IndexingConfig {
    /// Tantivyヒープサイズ（メガバイト単位）
    /// ディスクにフラッシュする前のメモリ使用量を制御
    #[serde(default = "default_tantivy_heap_mb")]
    pub tantivy_heap_mb: usize,

    /// 書き込みバッチごとにセグメントを統合するかどうか
    #[serde(default = "default_true")]
    pub optimize_after_write: bool,
}

/// 検索設定
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SearchConfig {
    /// 完全一致検索とフリーテキスト検索の上限件数
    #[serde(default = "default_free_text_limit")]
    pub free_text_limit: usize,

    /// 構造化検索の上限件数 (実質無制限)
    #[serde(default = "default_structured_limit")]
    pub structured_limit: usize,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_tantivy_heap_mb() -> usize {
    50
}
fn default_true() -> bool {
    true
}
fn default_free_text_limit() -> usize {
    10
}
fn default_structured_limit() -> usize {
    5_000_000
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            index_root: None,
            indexing: IndexingConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            tantivy_heap_mb: default_tantivy_heap_mb(),
            optimize_after_write: default_true(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            free_text_limit: default_free_text_limit(),
            structured_limit: default_structured_limit(),
        }
    }
}

impl Settings {
    /// Settings rooted at an explicit directory
    pub fn with_index_root(root: impl Into<PathBuf>) -> Self {
        Self {
            index_root: Some(root.into()),
            ..Self::default()
        }
    }

    /// Load configuration from the default file and the environment
    pub fn load() -> Result<Self, Box<figment::Error>> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load configuration from a specific file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            // Use double underscore (__) to separate nested levels
            .merge(Env::prefixed("EHR_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
            .map_err(Box::new)
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Resolve the index directory of a kind
    ///
    /// The first non-empty of: the explicit path, `index_root/<kind>`,
    /// `.ehr_index/<kind>`.
    pub fn index_dir_for(&self, kind: EntityKind, explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit.filter(|p| !p.as_os_str().is_empty()) {
            return path.to_path_buf();
        }
        if let Some(root) = self.index_root.as_deref().filter(|p| !p.as_os_str().is_empty()) {
            return root.join(kind.dir_name());
        }
        PathBuf::from(FALLBACK_INDEX_ROOT).join(kind.dir_name())
    }

    /// Writer heap budget in bytes
    pub fn heap_bytes(&self) -> usize {
        self.indexing.tantivy_heap_mb.saturating_mul(1_000_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.version, 1);
        assert!(settings.index_root.is_none());
        assert_eq!(settings.indexing.tantivy_heap_mb, 50);
        assert_eq!(settings.search.free_text_limit, 10);
        assert_eq!(settings.search.structured_limit, 5_000_000);
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        let toml_content = r#"
version = 2
index_root = "/srv/ehr/index"

[indexing]
tantivy_heap_mb = 120

[search]
free_text_limit = 25
"#;

        fs::write(&config_path, toml_content).unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.version, 2);
        assert_eq!(settings.index_root, Some(PathBuf::from("/srv/ehr/index")));
        assert_eq!(settings.indexing.tantivy_heap_mb, 120);
        assert_eq!(settings.search.free_text_limit, 25);
        // Unspecified values keep their defaults
        assert_eq!(settings.search.structured_limit, 5_000_000);
        assert!(settings.indexing.optimize_after_write);
    }

    #[test]
    fn test_save_settings() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("settings.toml");

        let mut settings = Settings::with_index_root("/data/index");
        settings.search.free_text_limit = 3;

        settings.save(&config_path).unwrap();

        let loaded = Settings::load_from(&config_path).unwrap();
        assert_eq!(loaded.search.free_text_limit, 3);
        assert_eq!(loaded.index_root, Some(PathBuf::from("/data/index")));
    }

    #[test]
    fn test_index_dir_resolution_order() {
        let settings = Settings::with_index_root("/ctx");

        // Explicit path wins
        assert_eq!(
            settings.index_dir_for(EntityKind::Patient, Some(Path::new("/explicit"))),
            PathBuf::from("/explicit")
        );

        // Empty explicit path counts as absent
        assert_eq!(
            settings.index_dir_for(EntityKind::Code, Some(Path::new(""))),
            PathBuf::from("/ctx/cid")
        );

        // Hard-coded fallback
        assert_eq!(
            Settings::default().index_dir_for(EntityKind::Record, None),
            PathBuf::from(FALLBACK_INDEX_ROOT).join("record")
        );
    }

    #[test]
    fn test_heap_bytes() {
        let settings = Settings::default();
        assert_eq!(settings.heap_bytes(), 50_000_000);

        let mut huge = Settings::default();
        huge.indexing.tantivy_heap_mb = usize::MAX;
        assert_eq!(huge.heap_bytes(), usize::MAX);
    }
}
