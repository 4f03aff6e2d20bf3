//! Typed configuration loaded from an INI document.
//!
//! Every stage receives an immutable snapshot of this struct at
//! construction; nothing reads configuration globally.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use configparser::ini::Ini;
use tracing::warn;

use crate::error::ConfigError;
use crate::types::{Entity, SourceSpec, SourceType};

pub const DEFAULT_DOMAINS: &[&str] = &[
    "LLM Tech & Products",
    "Data Platforms & Frameworks",
    "AI Platforms & Frameworks",
    "Agent Platforms & Frameworks",
    "Coding Agents",
    "Industry Agents",
    "Embodied AI",
    "Others",
];

pub const DEFAULT_CATEGORIES: &[&str] = &[
    "product launch",
    "product update",
    "opinion",
    "business news",
    "technical event",
    "customer case",
    "ads & hiring",
    "other",
];

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub lookback_days: i64,
    pub general_pool_size: usize,
    /// Randomized pause before each restricted-pool (microblog) fetch, seconds.
    pub delay_min: f64,
    pub delay_max: f64,
}

#[derive(Debug, Clone)]
pub struct EnricherConfig {
    pub pool_size: usize,
    pub max_urls_per_post: usize,
    pub url_timeout_s: u64,
}

#[derive(Debug, Clone)]
pub struct OrganizerConfig {
    pub pool_size: usize,
    pub retry_on_failure: u32,
    pub domains: Vec<String>,
    pub categories: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct XScraperConfig {
    pub enabled: bool,
    /// Pipe-delimited `token:csrf|token2:csrf2` pairs. Empty falls back to
    /// the env-style credential file next to the config.
    pub auth_credentials: String,
    pub max_tweets_per_user: usize,
    pub request_delay_min: f64,
    pub request_delay_max: f64,
    pub user_switch_delay_min: f64,
    pub user_switch_delay_max: f64,
    pub request_timeout: u64,
    pub max_retries: u32,
    pub include_retweets: bool,
    pub include_replies: bool,
    pub circuit_breaker_threshold: u32,
    pub circuit_breaker_cooldown: u64,
    /// JSON override of the GraphQL query ids, keyed by operation name.
    pub query_ids: Option<HashMap<String, String>>,
    /// JSON override of the GraphQL feature flags.
    pub features: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub llm: LlmConfig,
    pub fetcher: FetcherConfig,
    pub enricher: EnricherConfig,
    pub organizer: OrganizerConfig,
    pub x_scraper: XScraperConfig,
    pub sources: Vec<SourceSpec>,
    pub entities: Vec<Entity>,
    /// Output root, `data/` under the current directory by default.
    pub data_dir: PathBuf,
    /// Directory holding the config file; credential env fallback lives here.
    pub config_dir: PathBuf,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut ini = Ini::new_cs();
        ini.load(path)
            .map_err(|e| ConfigError::Unreadable(format!("{}: {e}", path.display())))?;

        let config_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let llm = LlmConfig {
            api_key: require(&ini, "llm", "api_key")?,
            base_url: require(&ini, "llm", "base_url")?,
            model: require(&ini, "llm", "model")?,
        };

        let fetcher = FetcherConfig {
            lookback_days: get_int(&ini, "fetcher", "lookback_days", 7)?,
            general_pool_size: get_int(&ini, "fetcher", "general_pool_size", 5)? as usize,
            delay_min: get_float(&ini, "fetcher", "delay_min", 15.0)?,
            delay_max: get_float(&ini, "fetcher", "delay_max", 25.0)?,
        };
        if fetcher.lookback_days <= 0 {
            return Err(ConfigError::Invalid(
                "fetcher.lookback_days must be positive".into(),
            ));
        }

        let enricher = EnricherConfig {
            pool_size: get_int(&ini, "enricher", "pool_size", 5)? as usize,
            max_urls_per_post: get_int(&ini, "enricher", "max_urls_per_post", 5)? as usize,
            url_timeout_s: get_int(&ini, "enricher", "url_timeout_s", 20)? as u64,
        };

        let organizer = OrganizerConfig {
            pool_size: get_int(&ini, "organizer", "pool_size", 5)? as usize,
            retry_on_failure: get_int(&ini, "organizer", "retry_on_failure", 2)? as u32,
            domains: get_list(&ini, "organizer", "domains", DEFAULT_DOMAINS),
            categories: get_list(&ini, "organizer", "categories", DEFAULT_CATEGORIES),
        };

        let x_scraper = XScraperConfig {
            enabled: get_bool(&ini, "x_scraper", "enabled", false)?,
            auth_credentials: ini
                .get("x_scraper", "auth_credentials")
                .unwrap_or_default()
                .trim()
                .to_string(),
            max_tweets_per_user: get_int(&ini, "x_scraper", "max_tweets_per_user", 20)? as usize,
            request_delay_min: get_float(&ini, "x_scraper", "request_delay_min", 15.0)?,
            request_delay_max: get_float(&ini, "x_scraper", "request_delay_max", 25.0)?,
            user_switch_delay_min: get_float(&ini, "x_scraper", "user_switch_delay_min", 30.0)?,
            user_switch_delay_max: get_float(&ini, "x_scraper", "user_switch_delay_max", 60.0)?,
            request_timeout: get_int(&ini, "x_scraper", "request_timeout", 30)? as u64,
            max_retries: get_int(&ini, "x_scraper", "max_retries", 3)? as u32,
            include_retweets: get_bool(&ini, "x_scraper", "include_retweets", false)?,
            include_replies: get_bool(&ini, "x_scraper", "include_replies", false)?,
            circuit_breaker_threshold: get_int(&ini, "x_scraper", "circuit_breaker_threshold", 5)?
                as u32,
            circuit_breaker_cooldown: get_int(&ini, "x_scraper", "circuit_breaker_cooldown", 60)?
                as u64,
            query_ids: get_json_map(&ini, "x_scraper", "query_ids"),
            features: get_json_object(&ini, "x_scraper", "features"),
        };

        let mut sources = Vec::new();
        for source_type in SourceType::ALL {
            for (name, value) in section_entries(&ini, source_type.accounts_section()) {
                sources.push(SourceSpec {
                    source_type,
                    name,
                    value,
                });
            }
        }
        if sources.is_empty() {
            return Err(ConfigError::Invalid(
                "no sources configured in any *_accounts section".into(),
            ));
        }

        let entities = section_entries(&ini, "entities")
            .into_iter()
            .map(|(name, aliases)| {
                let mut aliases: Vec<String> = aliases
                    .split(',')
                    .map(|a| a.trim().to_string())
                    .filter(|a| !a.is_empty())
                    .collect();
                if aliases.is_empty() {
                    aliases.push(name.clone());
                }
                Entity { name, aliases }
            })
            .collect();

        Ok(Self {
            llm,
            fetcher,
            enricher,
            organizer,
            x_scraper,
            sources,
            entities,
            data_dir: PathBuf::from("data"),
            config_dir,
        })
    }

    pub fn sources_of(&self, source_type: SourceType) -> Vec<&SourceSpec> {
        self.sources
            .iter()
            .filter(|s| s.source_type == source_type)
            .collect()
    }
}

fn require(ini: &Ini, section: &str, key: &str) -> Result<String, ConfigError> {
    ini.get(section, key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConfigError::Missing(format!("[{section}] {key}")))
}

fn get_int(ini: &Ini, section: &str, key: &str, default: i64) -> Result<i64, ConfigError> {
    match ini.getint(section, key) {
        Ok(Some(v)) => Ok(v),
        Ok(None) => Ok(default),
        Err(e) => Err(ConfigError::Invalid(format!("[{section}] {key}: {e}"))),
    }
}

fn get_float(ini: &Ini, section: &str, key: &str, default: f64) -> Result<f64, ConfigError> {
    match ini.getfloat(section, key) {
        Ok(Some(v)) => Ok(v),
        Ok(None) => Ok(default),
        Err(e) => Err(ConfigError::Invalid(format!("[{section}] {key}: {e}"))),
    }
}

fn get_bool(ini: &Ini, section: &str, key: &str, default: bool) -> Result<bool, ConfigError> {
    match ini.getbool(section, key) {
        Ok(Some(v)) => Ok(v),
        Ok(None) => Ok(default),
        Err(e) => Err(ConfigError::Invalid(format!("[{section}] {key}: {e}"))),
    }
}

fn get_list(ini: &Ini, section: &str, key: &str, default: &[&str]) -> Vec<String> {
    match ini.get(section, key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        _ => default.iter().map(|s| s.to_string()).collect(),
    }
}

/// Ordered (key, value) pairs of a section; empty when the section is absent.
fn section_entries(ini: &Ini, section: &str) -> Vec<(String, String)> {
    let Some(map) = ini.get_map_ref().get(section) else {
        return Vec::new();
    };
    map.iter()
        .filter_map(|(k, v)| {
            let value = v.clone().unwrap_or_default().trim().to_string();
            if value.is_empty() {
                None
            } else {
                Some((k.clone(), value))
            }
        })
        .collect()
}

fn get_json_map(ini: &Ini, section: &str, key: &str) -> Option<HashMap<String, String>> {
    let raw = ini.get(section, key)?;
    if raw.trim().is_empty() {
        return None;
    }
    match serde_json::from_str(&raw) {
        Ok(map) => Some(map),
        Err(e) => {
            warn!(section, key, error = %e, "Ignoring malformed JSON override");
            None
        }
    }
}

fn get_json_object(
    ini: &Ini,
    section: &str,
    key: &str,
) -> Option<serde_json::Map<String, serde_json::Value>> {
    let raw = ini.get(section, key)?;
    if raw.trim().is_empty() {
        return None;
    }
    match serde_json::from_str::<serde_json::Value>(&raw) {
        Ok(serde_json::Value::Object(map)) => Some(map),
        Ok(_) => {
            warn!(section, key, "JSON override is not an object, ignoring");
            None
        }
        Err(e) => {
            warn!(section, key, error = %e, "Ignoring malformed JSON override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(body: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.ini");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        (dir, path)
    }

    const MINIMAL: &str = r#"
[llm]
api_key = sk-test
base_url = https://llm.example/v1
model = test-model

[blog_accounts]
Acme Blog = https://acme.example/feed.xml
"#;

    #[test]
    fn minimal_config_gets_defaults() {
        let (_dir, path) = write_config(MINIMAL);
        let config = Config::load(&path).unwrap();

        assert_eq!(config.fetcher.lookback_days, 7);
        assert_eq!(config.fetcher.general_pool_size, 5);
        assert_eq!(config.enricher.pool_size, 5);
        assert_eq!(config.enricher.max_urls_per_post, 5);
        assert_eq!(config.organizer.retry_on_failure, 2);
        assert!(!config.x_scraper.enabled);
        assert_eq!(config.x_scraper.max_tweets_per_user, 20);
        assert_eq!(config.x_scraper.circuit_breaker_threshold, 5);
        assert_eq!(config.sources.len(), 1);
        assert_eq!(config.sources[0].source_type, SourceType::Blog);
        assert_eq!(config.sources[0].name, "Acme Blog");
    }

    #[test]
    fn missing_llm_section_is_fatal() {
        let (_dir, path) = write_config("[blog_accounts]\nA = https://a.example/feed\n");
        assert!(matches!(
            Config::load(&path),
            Err(ConfigError::Missing(_))
        ));
    }

    #[test]
    fn no_sources_is_fatal() {
        let (_dir, path) = write_config(
            "[llm]\napi_key = k\nbase_url = https://llm.example\nmodel = m\n",
        );
        assert!(matches!(Config::load(&path), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn entities_parse_aliases() {
        let body = format!("{MINIMAL}\n[entities]\nAcme = acme, Acme Corp, ACME Inc\n");
        let (_dir, path) = write_config(&body);
        let config = Config::load(&path).unwrap();

        assert_eq!(config.entities.len(), 1);
        assert_eq!(config.entities[0].name, "Acme");
        assert_eq!(config.entities[0].aliases.len(), 3);
    }

    #[test]
    fn malformed_json_override_is_ignored() {
        let body = format!("{MINIMAL}\n[x_scraper]\nenabled = true\nquery_ids = {{not json\n");
        let (_dir, path) = write_config(&body);
        let config = Config::load(&path).unwrap();

        assert!(config.x_scraper.enabled);
        assert!(config.x_scraper.query_ids.is_none());
    }

    #[test]
    fn source_names_keep_case() {
        let (_dir, path) = write_config(MINIMAL);
        let config = Config::load(&path).unwrap();
        assert_eq!(config.sources[0].name, "Acme Blog");
    }
}
