use std::{collections::HashMap, path::PathBuf};

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

/// Environment-sourced defaults (`AGENTPACK_*`). CLI flags override these;
/// these override the manifest's `[placement]` table.
pub struct AgentpackConfig {
    pub registry_dir: Option<PathBuf>,
    pub tolerance: Option<f64>,
    pub lambda: Option<f64>,
}

impl AgentpackConfig {
    pub fn load() -> anyhow::Result<Self> {
        let raw_config = RawConfig::load(None)?;

        Ok(Self {
            registry_dir: raw_config.registry.dir,
            tolerance: raw_config.placement.tolerance,
            lambda: raw_config.placement.lambda,
        })
    }
}

#[derive(Default, Debug, Deserialize, PartialEq)]
struct RawConfig {
    #[serde(default)]
    registry: RegistryConfig,
    #[serde(default)]
    placement: PlacementConfig,
}

#[derive(Default, Debug, Deserialize, PartialEq)]
struct RegistryConfig {
    dir: Option<PathBuf>,
}

#[derive(Default, Debug, Deserialize, PartialEq)]
struct PlacementConfig {
    tolerance: Option<f64>,
    lambda: Option<f64>,
}

impl RawConfig {
    fn load(env: Option<HashMap<String, String>>) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(
                Environment::with_prefix("AGENTPACK")
                    .separator("_")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn load_empty() {
        let env = HashMap::from([]);
        let config = RawConfig::load(Some(env)).unwrap();
        assert_eq!(
            config,
            RawConfig {
                registry: RegistryConfig { dir: None },
                placement: PlacementConfig {
                    tolerance: None,
                    lambda: None
                }
            }
        )
    }

    #[test]
    fn load_environment() {
        let env = HashMap::from([
            (
                "AGENTPACK_REGISTRY_DIR".to_owned(),
                "/registry".to_owned(),
            ),
            ("AGENTPACK_PLACEMENT_TOLERANCE".to_owned(), "0.25".to_owned()),
            ("AGENTPACK_PLACEMENT_LAMBDA".to_owned(), "1.5".to_owned()),
        ]);
        let config = RawConfig::load(Some(env)).unwrap();
        assert_eq!(
            config,
            RawConfig {
                registry: RegistryConfig {
                    dir: Some("/registry".into())
                },
                placement: PlacementConfig {
                    tolerance: Some(0.25),
                    lambda: Some(1.5)
                }
            }
        )
    }
}
