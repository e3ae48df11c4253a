//! # Compatibility Specifications
//!
//! This crate provides the data structures used to describe the compatibility
//! requirements of a built binary (or the capabilities of a host), together
//! with the logic to populate them from Spack install metadata, to select
//! hosts for a binary under increasingly descriptive matching strategies, and
//! to turn them into Flux jobspecs.
//!
//! The `CompatibilitySpec` document format is defined externally by the
//! compspec project. This crate only reads and writes it.

pub mod host;
pub mod jobspec;
pub mod levels;
pub mod select;
pub mod spack;

use anyhow::Result;
use log::error;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs, path::Path};

/// Name of the compatibility group holding OS, MPI and hardware attributes.
pub const SUPERCONTAINERS: &str = "org.supercontainers";
/// Name of the compatibility group holding CPU attributes.
pub const ARCHSPEC: &str = "io.archspec";

const SPEC_VERSION: &str = "0.0.0";
const SPEC_KIND: &str = "CompatibilitySpec";

/// # Description
///
/// Root of a compatibility specification document.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct CompatibilitySpec {
    /// The version of the specification format.
    pub version: String,
    /// Always `CompatibilitySpec`.
    pub kind: String,
    /// Name and schema locations.
    pub metadata: Metadata,
    /// Groups of attributes, one per schema.
    pub compatibilities: Vec<Compatibility>,
}

/// # Description
///
/// Metadata block of a compatibility specification.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Metadata {
    pub name: String,
    /// Maps a schema prefix (e.g. `io.archspec`) to the URL defining it.
    #[serde(default)]
    pub schemas: BTreeMap<String, String>,
}

/// # Description
///
/// A named group of attributes. Attribute values are optional as the
/// prototype document lists every known key before it is populated.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Compatibility {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, Option<String>>,
}

impl Compatibility {
    fn with_keys(name: &str, keys: &[&str]) -> Self {
        Compatibility {
            name: name.to_string(),
            version: SPEC_VERSION.to_string(),
            attributes: keys.iter().map(|key| (key.to_string(), None)).collect(),
        }
    }
}

impl CompatibilitySpec {
    /// # Description
    ///
    /// Returns the empty prototype used to describe a LAMMPS build. Every
    /// attribute is present, and unset.
    pub fn lammps_prototype() -> Self {
        CompatibilitySpec {
            version: SPEC_VERSION.to_string(),
            kind: SPEC_KIND.to_string(),
            metadata: Metadata {
                name: "lammps-prototype".to_string(),
                schemas: BTreeMap::from([
                    (
                        ARCHSPEC.to_string(),
                        "https://raw.githubusercontent.com/supercontainers/compspec/main/archspec/compspec.json".to_string(),
                    ),
                    (
                        SUPERCONTAINERS.to_string(),
                        "https://raw.githubusercontent.com/supercontainers/compspec/main/supercontainers/compspec.json".to_string(),
                    ),
                ]),
            },
            compatibilities: vec![
                Compatibility::with_keys(
                    SUPERCONTAINERS,
                    &[
                        "hardware.gpu.available",
                        "mpi.implementation",
                        "mpi.version",
                        "os.name",
                        "os.release",
                        "os.vendor",
                        "os.version",
                    ],
                ),
                Compatibility::with_keys(ARCHSPEC, &["cpu.model", "cpu.target", "cpu.vendor"]),
            ],
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            let reason = format!("error reading spec (path={}, error={e:?})", path.display());
            error!("{reason}");
            anyhow::anyhow!(reason)
        })?;

        Self::from_json(&contents).map_err(|e| {
            let reason = format!("error parsing spec (path={}, error={e:?})", path.display());
            error!("{reason}");
            anyhow::anyhow!(reason)
        })
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Get a populated attribute from a named compatibility group.
    pub fn attribute(&self, compatibility: &str, key: &str) -> Option<&str> {
        self.compatibilities
            .iter()
            .find(|c| c.name == compatibility)
            .and_then(|c| c.attributes.get(key))
            .and_then(|value| value.as_deref())
    }

    /// Get the first populated value for `key` across all groups.
    pub fn find_attribute(&self, key: &str) -> Option<&str> {
        self.compatibilities
            .iter()
            .filter_map(|c| c.attributes.get(key))
            .find_map(|value| value.as_deref())
    }

    /// # Description
    ///
    /// Set an attribute in a named compatibility group, creating the group if
    /// the document does not have it yet.
    pub fn set_attribute(&mut self, compatibility: &str, key: &str, value: impl Into<String>) {
        let idx = match self
            .compatibilities
            .iter()
            .position(|c| c.name == compatibility)
        {
            Some(idx) => idx,
            None => {
                self.compatibilities
                    .push(Compatibility::with_keys(compatibility, &[]));
                self.compatibilities.len() - 1
            }
        };

        self.compatibilities[idx]
            .attributes
            .insert(key.to_string(), Some(value.into()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prototype_has_all_keys_unset() {
        let spec = CompatibilitySpec::lammps_prototype();

        assert_eq!(spec.kind, "CompatibilitySpec");
        assert_eq!(spec.compatibilities.len(), 2);
        assert_eq!(spec.compatibilities[0].name, SUPERCONTAINERS);
        assert_eq!(spec.compatibilities[0].attributes.len(), 7);
        assert_eq!(spec.compatibilities[1].name, ARCHSPEC);
        assert_eq!(spec.compatibilities[1].attributes.len(), 3);
        assert!(spec.find_attribute("cpu.target").is_none());
    }

    #[test]
    fn test_prototype_serializes_nulls() {
        let json = CompatibilitySpec::lammps_prototype()
            .to_json_pretty()
            .unwrap();

        assert!(json.contains("\"cpu.target\": null"));
        assert!(json.contains("\"kind\": \"CompatibilitySpec\""));
    }

    #[test]
    fn test_set_and_get_attribute() {
        let mut spec = CompatibilitySpec::lammps_prototype();
        spec.set_attribute(ARCHSPEC, "cpu.target", "amd64");
        spec.set_attribute("io.custom", "thing", "value");

        assert_eq!(spec.attribute(ARCHSPEC, "cpu.target"), Some("amd64"));
        assert_eq!(spec.attribute(SUPERCONTAINERS, "cpu.target"), None);
        assert_eq!(spec.find_attribute("cpu.target"), Some("amd64"));
        assert_eq!(spec.attribute("io.custom", "thing"), Some("value"));
        assert_eq!(spec.compatibilities.len(), 3);
    }

    #[test]
    fn test_parse_external_document() {
        let json = r#"{
            "version": "0.0.0",
            "kind": "CompatibilitySpec",
            "metadata": {"name": "lassen-build"},
            "compatibilities": [
                {
                    "name": "org.supercontainers",
                    "version": "0.0.0",
                    "attributes": {"mpi.implementation": "spectrum-mpi", "os.release": "7.9"}
                },
                {
                    "name": "io.archspec",
                    "version": "0.0.0",
                    "attributes": {"cpu.target": "ppc64le"}
                }
            ]
        }"#;

        let spec = CompatibilitySpec::from_json(json).unwrap();
        assert!(spec.metadata.schemas.is_empty());
        assert_eq!(spec.find_attribute("os.release"), Some("7.9"));
        assert_eq!(spec.find_attribute("cpu.target"), Some("ppc64le"));
    }
}
