use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{LogHistoryError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Tracked website
    pub site: SiteConfig,

    /// Access log location
    pub log: LogConfig,

    /// Path policy applied before sessions are built
    pub filters: FilterConfig,

    /// Folder classification
    pub folders: FolderConfig,

    /// Automated traffic detection
    pub bots: BotConfig,

    /// Output settings
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Host name as it appears in referrers (e.g. "www.example.com")
    pub name: String,

    /// Scheme prefix prepended to the host in referrers (e.g. "http://")
    pub protocol: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Access log to analyze
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Substrings marking a request as a trackable page
    pub whitelist_extensions: Vec<String>,

    /// Substrings excluding a request (and a synthesized flow point) entirely
    pub blacklist_folders: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FolderConfig {
    /// Number of leading path segments forming a folder, 0 keeps the whole path
    pub depth: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentinelField {
    ClientAddress,
    Path,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Case-sensitive user-agent substrings identifying crawlers
    pub user_agent_markers: Vec<String>,

    /// Substring that flags a session as automated when found in `sentinel_field`
    pub sentinel: String,

    /// Request field the sentinel is looked up in
    pub sentinel_field: SentinelField,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory receiving tree.json, flow.json and stack.json
    pub dir: PathBuf,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            name: "localhost".to_string(),
            protocol: "http://".to_string(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/log/apache2/access.log"),
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            whitelist_extensions: vec![".php".to_string(), ".html".to_string(), ".htm".to_string()],
            blacklist_folders: vec![],
        }
    }
}

impl Default for FolderConfig {
    fn default() -> Self {
        Self { depth: 1 }
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            user_agent_markers: vec!["bot".to_string(), "crawl".to_string(), "spider".to_string()],
            sentinel: "robot.txt".to_string(),
            sentinel_field: SentinelField::ClientAddress,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site: SiteConfig::default(),
            log: LogConfig::default(),
            filters: FilterConfig::default(),
            folders: FolderConfig::default(),
            bots: BotConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

/// Flat `config.json` layout used by older deployments of the tool
#[derive(Debug, Deserialize)]
struct LegacyConfig {
    website_name: String,
    protocol_used: String,
    access_log_location: PathBuf,
    #[serde(default)]
    whitelist_extensions: Vec<String>,
    #[serde(default)]
    blacklist_folders: Vec<String>,
    folder_level: i64,
}

impl From<LegacyConfig> for Config {
    fn from(legacy: LegacyConfig) -> Self {
        Self {
            site: SiteConfig {
                name: legacy.website_name,
                protocol: legacy.protocol_used,
            },
            log: LogConfig {
                path: legacy.access_log_location,
            },
            filters: FilterConfig {
                whitelist_extensions: legacy.whitelist_extensions,
                blacklist_folders: legacy.blacklist_folders,
            },
            folders: FolderConfig {
                // non-positive levels mean "whole path"
                depth: usize::try_from(legacy.folder_level).unwrap_or(0),
            },
            ..Self::default()
        }
    }
}

impl Config {
    /// Load configuration from file, JSON when the extension says so, TOML otherwise
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;

        let config: Config = if path.extension().and_then(|e| e.to_str()) == Some("json") {
            let legacy: LegacyConfig = serde_json::from_str(&content)
                .map_err(|e| LogHistoryError::Config(format!("{}: {}", path.display(), e)))?;
            legacy.into()
        } else {
            toml::from_str(&content)?
        };

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| LogHistoryError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration with fallback to default
    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        match path {
            Some(p) => {
                if p.as_ref().exists() {
                    Self::load(p)
                } else {
                    Err(LogHistoryError::Config(format!(
                        "config file {} does not exist",
                        p.as_ref().display()
                    )))
                }
            }
            None => {
                // Try common config file locations
                let candidates = ["loghistory.toml", ".loghistory.toml", "config.json"];

                for candidate in &candidates {
                    if Path::new(candidate).exists() {
                        return Self::load(candidate);
                    }
                }

                Ok(Self::default())
            }
        }
    }

    /// Reject settings the builders cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.site.name.trim().is_empty() {
            return Err(LogHistoryError::Config("site.name must not be empty".to_string()));
        }
        if self.site.protocol.trim().is_empty() {
            return Err(LogHistoryError::Config("site.protocol must not be empty".to_string()));
        }
        Ok(())
    }

    /// `protocol + site`, the prefix every same-site referrer starts with
    pub fn site_prefix(&self) -> String {
        format!("{}{}", self.site.protocol, self.site.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
[site]
name = "www.example.com"
protocol = "https://"

[folders]
depth = 2
"#,
        )
        .unwrap();

        assert_eq!(config.site_prefix(), "https://www.example.com");
        assert_eq!(config.folders.depth, 2);
        assert_eq!(config.bots.sentinel_field, SentinelField::ClientAddress);
        assert_eq!(config.output.dir, PathBuf::from("data"));
    }

    #[test]
    fn test_partial_section_falls_back_per_field() {
        let config: Config = toml::from_str("[site]\nname = \"x\"\n\n[bots]\nsentinel = \"\"\n").unwrap();

        assert_eq!(config.site.name, "x");
        assert_eq!(config.site.protocol, "http://");
        assert_eq!(config.bots.sentinel, "");
        assert_eq!(config.bots.user_agent_markers, BotConfig::default().user_agent_markers);
    }

    #[test]
    fn test_invalid_toml_is_a_toml_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loghistory.toml");
        std::fs::write(&path, "[site\nname = ").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, LogHistoryError::Toml(_)));
    }

    #[test]
    fn test_legacy_json_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "website_name": "www.example.com",
                "protocol_used": "http://",
                "access_log_location": "/tmp/access.log",
                "whitelist_extensions": [".php"],
                "blacklist_folders": ["/admin"],
                "folder_level": -1
            }"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.site.name, "www.example.com");
        assert_eq!(config.log.path, PathBuf::from("/tmp/access.log"));
        assert_eq!(config.filters.blacklist_folders, vec!["/admin".to_string()]);
        assert_eq!(config.folders.depth, 0);
    }

    #[test]
    fn test_empty_site_name_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loghistory.toml");
        std::fs::write(&path, "[site]\nname = \"\"\nprotocol = \"http://\"\n").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, LogHistoryError::Config(_)));
    }

    #[test]
    fn test_missing_explicit_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(Config::load_or_default(Some(&missing)).is_err());
    }

    #[test]
    fn test_save_round_trips_through_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loghistory.toml");
        let mut config = Config::default();
        config.bots.sentinel_field = SentinelField::Path;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.bots.sentinel_field, SentinelField::Path);
        assert_eq!(loaded.filters.whitelist_extensions, config.filters.whitelist_extensions);
    }
}
