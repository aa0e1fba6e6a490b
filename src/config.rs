//! Optional config file loading. Search order: ./wxrbook.toml, then
//! $XDG_CONFIG_HOME/wxrbook/config.toml (or ~/.config/wxrbook/config.toml).

use crate::model::PostType;
use serde::Deserialize;

const DEFAULT_SUPPORTED_TYPES: [&str; 7] = [
    "post",
    "page",
    "front-matter",
    "chapter",
    "part",
    "back-matter",
    "metadata",
];
const DEFAULT_TAXONOMIES: [&str; 3] = ["front-matter-type", "chapter-type", "back-matter-type"];
const DEFAULT_POST_META_KEYS: [&str; 6] = [
    "pb_section_author",
    "pb_section_license",
    "pb_short_title",
    "pb_subtitle",
    "pb_show_title",
    "pb_export",
];
const DEFAULT_MULTI_VALUE_KEYS: [&str; 3] = [
    "pb_contributing_authors",
    "pb_keywords_tags",
    "pb_bisac_subject",
];
const DEFAULT_METADATA_PREFIX: &str = "pb_";
const SKIP_SENTINELS: [&str; 2] = ["<!-- Here be dragons.-->", "<!-- Here be dragons. -->"];

/// Config file contents. All fields optional; only present keys override defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct Config {
    /// HTTP User-Agent header for image downloads.
    pub user_agent: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Delay in seconds between image requests.
    pub request_delay_secs: Option<u64>,
    /// Status for imported records other than parts and metadata: publish, draft, private, pending.
    pub default_status: Option<String>,
    /// When set, image references become `<media_base_url>/<file>` instead of `media/<file>`.
    pub media_base_url: Option<String>,
    pub supported_post_types: Option<Vec<String>>,
    /// Non-book types kept after sorting, emitted after back matter.
    pub custom_post_types: Option<Vec<String>>,
    pub taxonomies: Option<Vec<String>>,
    pub post_meta_keys: Option<Vec<String>>,
    pub multi_value_meta_keys: Option<Vec<String>>,
    pub metadata_key_prefix: Option<String>,
}

/// Search order: (1) ./wxrbook.toml, (2) $XDG_CONFIG_HOME/wxrbook/config.toml.
/// Missing file returns Ok(None). Invalid TOML or I/O error reading a present file returns Err.
pub fn load_config() -> Result<Option<Config>, String> {
    let cwd = std::env::current_dir()
        .map_err(|e| format!("Cannot determine current directory: {}", e))?;
    let mut paths = vec![cwd.join("wxrbook.toml")];
    if let Some(d) = dirs::config_dir() {
        paths.push(d.join("wxrbook").join("config.toml"));
    }
    for path in &paths {
        if path.exists() {
            let s = std::fs::read_to_string(path)
                .map_err(|e| format!("Cannot read config {}: {}", path.display(), e))?;
            let config: Config = toml::from_str(&s)
                .map_err(|e| format!("Invalid config {}: {}", path.display(), e))?;
            return Ok(Some(config));
        }
    }
    Ok(None)
}

/// Allow-lists and key rules the importer runs with.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportConfig {
    /// Post types that survive staging.
    pub supported_post_types: Vec<PostType>,
    pub custom_post_types: Vec<PostType>,
    /// Term domains that are associated with created records.
    pub taxonomies: Vec<String>,
    /// Keys copied onto non-metadata records.
    pub post_meta_keys: Vec<String>,
    pub multi_value_meta_keys: Vec<String>,
    /// Prefix of keys copied onto the metadata record.
    pub metadata_key_prefix: String,
    /// Content that marks a post as not importable.
    pub skip_sentinels: Vec<String>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            supported_post_types: DEFAULT_SUPPORTED_TYPES
                .iter()
                .map(|t| PostType::from(*t))
                .collect(),
            custom_post_types: Vec::new(),
            taxonomies: owned(&DEFAULT_TAXONOMIES),
            post_meta_keys: owned(&DEFAULT_POST_META_KEYS),
            multi_value_meta_keys: owned(&DEFAULT_MULTI_VALUE_KEYS),
            metadata_key_prefix: DEFAULT_METADATA_PREFIX.to_string(),
            skip_sentinels: owned(&SKIP_SENTINELS),
        }
    }
}

impl ImportConfig {
    /// Defaults with every key present in `config` replacing its default.
    pub fn from_config(config: &Config) -> Self {
        let mut c = Self::default();
        if let Some(types) = &config.supported_post_types {
            c.supported_post_types = types.iter().map(|t| PostType::from(t.as_str())).collect();
        }
        if let Some(types) = &config.custom_post_types {
            c.custom_post_types = types.iter().map(|t| PostType::from(t.as_str())).collect();
        }
        if let Some(v) = &config.taxonomies {
            c.taxonomies = v.clone();
        }
        if let Some(v) = &config.post_meta_keys {
            c.post_meta_keys = v.clone();
        }
        if let Some(v) = &config.multi_value_meta_keys {
            c.multi_value_meta_keys = v.clone();
        }
        if let Some(v) = &config.metadata_key_prefix {
            c.metadata_key_prefix = v.clone();
        }
        c
    }

    pub fn is_supported(&self, t: &PostType) -> bool {
        self.supported_post_types.contains(t)
    }

    pub fn is_multi_valued(&self, key: &str) -> bool {
        self.multi_value_meta_keys.iter().any(|k| k == key)
    }

    pub fn allows_taxonomy(&self, domain: &str) -> bool {
        self.taxonomies.iter().any(|t| t == domain)
    }

    /// True when `content` is one of the do-not-import placeholders.
    pub fn is_placeholder(&self, content: &str) -> bool {
        let content = content.trim();
        self.skip_sentinels.iter().any(|s| s == content)
    }
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_empty_config() {
        let c: Config = toml::from_str("").unwrap();
        assert!(c.user_agent.is_none());
        assert!(c.request_delay_secs.is_none());
        assert!(c.timeout_secs.is_none());
        assert!(c.default_status.is_none());
        assert!(c.media_base_url.is_none());
        assert!(c.taxonomies.is_none());
        assert_eq!(ImportConfig::from_config(&c), ImportConfig::default());
    }

    #[test]
    fn parse_full_config() {
        let s = r#"
            user_agent = "Custom/1.0"
            request_delay_secs = 3
            timeout_secs = 60
            default_status = "publish"
            media_base_url = "https://cdn.example.com/media"
            supported_post_types = ["chapter", "part"]
            custom_post_types = ["glossary"]
            taxonomies = ["chapter-type"]
            post_meta_keys = ["pb_subtitle"]
            multi_value_meta_keys = ["pb_keywords_tags"]
            metadata_key_prefix = "book_"
        "#;
        let c: Config = toml::from_str(s).unwrap();
        assert_eq!(c.user_agent.as_deref(), Some("Custom/1.0"));
        assert_eq!(c.request_delay_secs, Some(3));
        assert_eq!(c.timeout_secs, Some(60));
        assert_eq!(c.default_status.as_deref(), Some("publish"));

        let ic = ImportConfig::from_config(&c);
        assert_eq!(ic.supported_post_types, vec![PostType::Chapter, PostType::Part]);
        assert_eq!(ic.custom_post_types, vec![PostType::from("glossary")]);
        assert!(ic.allows_taxonomy("chapter-type"));
        assert!(!ic.allows_taxonomy("front-matter-type"));
        assert_eq!(ic.post_meta_keys, vec!["pb_subtitle".to_string()]);
        assert_eq!(ic.metadata_key_prefix, "book_");
        // Sentinels are not configurable.
        assert!(ic.is_placeholder("<!-- Here be dragons.-->"));
    }

    #[test]
    fn parse_partial_config() {
        let c: Config = toml::from_str("request_delay_secs = 1").unwrap();
        assert_eq!(c.request_delay_secs, Some(1));
        assert!(c.user_agent.is_none());
        let ic = ImportConfig::from_config(&c);
        assert!(ic.is_supported(&PostType::Metadata));
        assert!(ic.is_supported(&PostType::from("page")));
    }

    #[test]
    fn defaults_match_book_conventions() {
        let ic = ImportConfig::default();
        assert!(!ic.is_supported(&PostType::from("attachment")));
        assert!(ic.is_multi_valued("pb_contributing_authors"));
        assert!(!ic.is_multi_valued("pb_subtitle"));
        assert!(ic.is_placeholder("  <!-- Here be dragons. -->\n"));
        assert!(!ic.is_placeholder("<p>Here be dragons.</p>"));
    }

    #[test]
    fn invalid_toml_errors() {
        assert!(toml::from_str::<Config>("taxonomies = [").is_err());
    }
}
