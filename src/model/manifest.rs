use std::path::Path;

use log::{debug, error};
use toml::{map::Map, Value};

use crate::model::{package::PackageName, version::VersionRange, ParseError};

/// A declared requirement on a context package.
#[derive(Debug, Clone, PartialEq)]
pub struct Requirement {
    pub name: PackageName,
    pub range: VersionRange,
}

/// Placement tuning declared in the manifest. Values are optional so that
/// environment configuration and CLI flags can fill the gaps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlacementOverrides {
    pub tolerance: Option<f64>,
    pub lambda: Option<f64>,
}

/// The project manifest (`agentpack.toml`): the root set of package
/// requirements plus compile tuning. Requirements keep their declaration
/// order, which seeds the resolver's deterministic traversal.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    pub name: PackageName,
    pub description: Option<String>,
    pub requirements: Vec<Requirement>,
    pub placement: PlacementOverrides,
}

impl Manifest {
    pub fn new(name: PackageName) -> Manifest {
        Manifest {
            name,
            description: None,
            requirements: Vec::new(),
            placement: PlacementOverrides::default(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Manifest, ParseError> {
        debug!("Attempting to read manifest from {}", path.display());
        let contents = std::fs::read_to_string(path)?;

        let manifest = Manifest::from_toml_str(&contents);
        if let Err(err) = &manifest {
            error!("Could not build a valid manifest from a toml file due to err {err}")
        }
        manifest
    }

    pub fn from_toml_str(data: &str) -> Result<Manifest, ParseError> {
        let mut toml_value = toml::from_str::<toml::Table>(data)?;

        let name = toml_value
            .remove("name")
            .ok_or_else(|| ParseError::MissingKey("name".to_string()))
            .and_then(|v| v.try_into::<PackageName>().map_err(|e| e.into()))?;

        let description = toml_value
            .remove("description")
            .map(|v| v.try_into::<String>())
            .map_or(Ok(None), |v| v.map(Some))?;

        let requirements = match toml_value.remove("dependencies") {
            None => Vec::new(),
            Some(value) => parse_requirements(&value)?,
        };

        let placement = match toml_value.remove("placement") {
            None => PlacementOverrides::default(),
            Some(value) => parse_placement(&value)?,
        };

        Ok(Manifest {
            name,
            description,
            requirements,
            placement,
        })
    }

    pub fn into_toml(self) -> Value {
        let mut root = Map::new();
        root.insert("name".to_string(), Value::String(self.name.to_string()));
        if let Some(d) = self.description {
            root.insert("description".to_string(), Value::String(d));
        }

        let mut dependencies = Map::new();
        for requirement in self.requirements {
            dependencies.insert(
                requirement.name.to_string(),
                Value::String(requirement.range.to_string()),
            );
        }
        root.insert("dependencies".to_string(), Value::Table(dependencies));
        Value::Table(root)
    }
}

fn parse_requirements(value: &Value) -> Result<Vec<Requirement>, ParseError> {
    let table = value
        .as_table()
        .ok_or_else(|| ParseError::MissingKey("dependencies".to_string()))?;

    // `toml` preserves the table order, so requirements come out in the
    // order the manifest declares them.
    table
        .iter()
        .map(|(name, value)| {
            let range = value
                .clone()
                .try_into::<String>()
                .map_err(ParseError::from)
                .and_then(|s| s.parse::<VersionRange>())?;
            Ok(Requirement {
                name: PackageName::from(name.as_str()),
                range,
            })
        })
        .collect()
}

fn parse_placement(value: &Value) -> Result<PlacementOverrides, ParseError> {
    let tolerance = value
        .get("tolerance")
        .map(|v| v.clone().try_into::<f64>())
        .map_or(Ok(None), |v| v.map(Some))?;

    let lambda = value
        .get("lambda")
        .map(|v| v.clone().try_into::<f64>())
        .map_or(Ok(None), |v| v.map(Some))?;

    Ok(PlacementOverrides { tolerance, lambda })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn load_valid_manifest() {
        let str = r#"
            name = "my-project"
            description = "this is a description"

            [dependencies]
            style-guide = ">=1.2.0"
            base-rules = "^2.0.0"
        "#;
        let manifest = Manifest::from_toml_str(str).unwrap();
        assert_eq!(manifest.name, PackageName::from("my-project"));
        assert_eq!(
            manifest.description,
            Some("this is a description".to_string())
        );
        assert_eq!(
            manifest.requirements,
            vec![
                Requirement {
                    name: PackageName::from("style-guide"),
                    range: ">=1.2.0".parse().unwrap(),
                },
                Requirement {
                    name: PackageName::from("base-rules"),
                    range: "^2.0.0".parse().unwrap(),
                },
            ]
        );
        assert_eq!(manifest.placement, PlacementOverrides::default());
    }

    #[test]
    fn load_manifest_with_placement() {
        let str = r#"
            name = "my-project"

            [placement]
            tolerance = 0.25
            lambda = 1.5
        "#;
        let manifest = Manifest::from_toml_str(str).unwrap();
        assert_eq!(
            manifest.placement,
            PlacementOverrides {
                tolerance: Some(0.25),
                lambda: Some(1.5),
            }
        );
    }

    #[test]
    fn load_manifest_no_deps() {
        let str = r#"
            name = "bare"
        "#;
        let manifest = Manifest::from_toml_str(str).unwrap();
        assert!(manifest.requirements.is_empty());
    }

    #[test]
    fn missing_name_is_an_error() {
        let str = r#"
            description = "nameless"
        "#;
        assert!(matches!(
            Manifest::from_toml_str(str),
            Err(ParseError::MissingKey(key)) if key == "name"
        ));
    }

    #[test]
    fn invalid_range_is_an_error() {
        let str = r#"
            name = "my-project"

            [dependencies]
            style-guide = "latest"
        "#;
        assert!(Manifest::from_toml_str(str).is_err());
    }

    #[test]
    fn skeleton_round_trips() {
        let manifest = Manifest::new(PackageName::from("fresh"));
        let toml_value = manifest.clone().into_toml();
        let rendered = toml::to_string_pretty(&toml_value).unwrap();
        assert_eq!(Manifest::from_toml_str(&rendered).unwrap(), manifest);
    }
}
