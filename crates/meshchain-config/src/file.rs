//! Entry files: a TOML or JSON document listing config entries.
//!
//! ```toml
//! [[entries]]
//! kind = "service-resolver"
//! name = "web"
//! connect_timeout = "3s"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::chain_set::DiscoveryChainSet;
use crate::entry::ConfigEntry;
use crate::error::{ConfigError, ConfigResult};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntriesFile {
    #[serde(default)]
    pub entries: Vec<ConfigEntry>,
}

impl EntriesFile {
    /// Load from `.toml` or `.json`, chosen by extension.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let file = match ext {
            "toml" => Self::from_toml_str(&content)?,
            "json" => Self::from_json_str(&content)?,
            other => return Err(ConfigError::UnsupportedFormat(other.to_string())),
        };
        debug!(path = %path.display(), entries = file.entries.len(), "loaded config entries");
        Ok(file)
    }

    pub fn from_toml_str(s: &str) -> ConfigResult<Self> {
        let mut file: EntriesFile = toml::from_str(s)?;
        file.normalize();
        Ok(file)
    }

    pub fn from_json_str(s: &str) -> ConfigResult<Self> {
        let mut file: EntriesFile = serde_json::from_str(s)?;
        file.normalize();
        Ok(file)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    fn normalize(&mut self) {
        for entry in &mut self.entries {
            entry.normalize();
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        for entry in &self.entries {
            entry.validate()?;
        }
        Ok(())
    }

    pub fn into_chain_set(self) -> DiscoveryChainSet {
        let mut set = DiscoveryChainSet::new();
        set.add_entries(self.entries);
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::ServiceID;
    use std::fs;
    use std::time::Duration;

    const SAMPLE: &str = r#"
[[entries]]
kind = "proxy-defaults"
config = { protocol = "http" }

[[entries]]
kind = "service-defaults"
name = "web"
protocol = "HTTP"

[[entries]]
kind = "service-resolver"
name = "web"
connect_timeout = "3s"
default_subset = "v1"

[entries.subsets.v1]
filter = "Service.Meta.version == v1"

[[entries]]
kind = "service-splitter"
name = "web"
splits = [
    { weight = 90.0, service_subset = "v1" },
    { weight = 10.0, service = "canary" },
]
"#;

    #[test]
    fn parse_toml_entries() {
        let file = EntriesFile::from_toml_str(SAMPLE).unwrap();
        assert_eq!(file.entries.len(), 4);
        assert!(file.validate().is_ok());

        let set = file.into_chain_set();
        let web = ServiceID::named("web");
        let resolver = set.get_resolver(&web).unwrap();
        assert_eq!(resolver.connect_timeout, Duration::from_secs(3));
        assert!(resolver.subset_exists("v1"));
        assert_eq!(set.get_service(&web).unwrap().protocol, "http");
        assert_eq!(set.get_proxy_defaults("default").unwrap().protocol(), Some("http"));
        assert_eq!(set.get_splitter(&web).unwrap().splits.len(), 2);
    }

    #[test]
    fn load_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entries.json");
        fs::write(
            &path,
            r#"{"entries": [{"kind": "service-router", "name": "web", "routes": [
                {"match": {"http": {"path_prefix": "/api"}}, "destination": {"service": "api"}}
            ]}]}"#,
        )
        .unwrap();

        let file = EntriesFile::from_file(&path).unwrap();
        let set = file.into_chain_set();
        let router = set.get_router(&ServiceID::named("web")).unwrap();
        assert_eq!(router.routes[0].destination.as_ref().unwrap().service, "api");
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entries.yaml");
        fs::write(&path, "entries: []").unwrap();
        assert!(matches!(
            EntriesFile::from_file(&path),
            Err(ConfigError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn bad_duration_is_a_parse_error() {
        let err = EntriesFile::from_toml_str(
            r#"
[[entries]]
kind = "service-resolver"
name = "web"
connect_timeout = "eventually"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }
}
