use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};

use meshchain_compiler::compile;
use meshchain_config::{DiscoveryChainSet, EntriesFile};

use super::{Coordinates, describe_chain_error};

#[derive(Debug, Serialize)]
pub struct Check {
    pub service: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Compile a chain for every service the entries name. Services are
/// evaluated in their own namespace and partition.
pub fn check_chains(set: &DiscoveryChainSet, coordinates: &Coordinates) -> Vec<Check> {
    set.service_ids()
        .into_iter()
        .map(|sid| {
            let coords = Coordinates {
                namespace: sid.namespace.clone(),
                partition: sid.partition.clone(),
                ..coordinates.clone()
            };
            let result = compile(coords.request(&sid.name, set));
            Check {
                service: sid.to_string(),
                ok: result.is_ok(),
                error: result.err().map(|e| describe_chain_error(e).to_string()),
            }
        })
        .collect()
}

pub fn validate(entries: &Path, coordinates: &Coordinates, format: &str) -> anyhow::Result<()> {
    let file = EntriesFile::from_file(entries)?;
    file.validate()?;
    let set = file.into_chain_set();

    let checks = check_chains(&set, coordinates);
    let failed = checks.iter().filter(|c| !c.ok).count();

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&checks)?),
        _ => {
            for check in &checks {
                match &check.error {
                    None => println!("✓ {}", check.service),
                    Some(err) => println!("✗ {}: {err}", check.service),
                }
            }
        }
    }

    if failed > 0 {
        warn!(failed, total = checks.len(), "validation failed");
        anyhow::bail!("{failed} of {} chains failed to compile", checks.len());
    }
    info!(total = checks.len(), "all chains compiled");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coordinates() -> Coordinates {
        Coordinates {
            namespace: "default".to_string(),
            partition: "default".to_string(),
            datacenter: "dc1".to_string(),
            trust_domain: "consul".to_string(),
        }
    }

    #[test]
    fn reports_each_service() {
        let file = EntriesFile::from_toml_str(
            r#"
[[entries]]
kind = "service-resolver"
name = "web"
redirect = { service = "api" }

[[entries]]
kind = "service-resolver"
name = "api"
redirect = { service = "web" }

[[entries]]
kind = "service-defaults"
name = "db"
protocol = "tcp"
"#,
        )
        .unwrap();

        let checks = check_chains(&file.into_chain_set(), &coordinates());
        let summary: Vec<(&str, bool)> = checks.iter().map(|c| (c.service.as_str(), c.ok)).collect();
        assert_eq!(summary, [("api", false), ("db", true), ("web", false)]);
        assert!(
            checks[0]
                .error
                .as_deref()
                .unwrap()
                .starts_with("invalid configuration: detected circular resolver redirect")
        );
    }

    #[test]
    fn services_compile_in_their_own_namespace() {
        let file = EntriesFile::from_toml_str(
            r#"
[[entries]]
kind = "service-defaults"
name = "web"
namespace = "ns1"
protocol = "http"

[[entries]]
kind = "service-router"
name = "web"
namespace = "ns1"
routes = [{ match = { http = { path_prefix = "/" } }, destination = { service_subset = "v9" } }]
"#,
        )
        .unwrap();

        let checks = check_chains(&file.into_chain_set(), &coordinates());
        assert_eq!(checks.len(), 1);
        assert_eq!(checks[0].service, "default/ns1/web");
        assert!(!checks[0].ok);
        assert!(
            checks[0].error.as_deref().unwrap().contains("does not have a subset named \"v9\""),
            "{:?}",
            checks[0].error
        );
    }

    #[test]
    fn validate_file_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entries.json");
        std::fs::write(
            &path,
            r#"{"entries": [{"kind": "service-defaults", "name": "web", "protocol": "http"}]}"#,
        )
        .unwrap();

        validate(&path, &coordinates(), "json").unwrap();
    }
}
