//! Populate a `CompatibilitySpec` from a Spack install prefix.
//!
//! Spack records the concretized spec of every install under
//! `<prefix>/.spack/spec.json`, and the environment it was built in under
//! `<prefix>/.spack/install_environment.json`. The CPU and OS details of the
//! build host come from a `compspec extract` run on that host.

use crate::{ARCHSPEC, CompatibilitySpec, SUPERCONTAINERS};
use anyhow::Result;
use log::error;
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;
use std::{fs, path::Path};

pub const SPEC_FILE_NAME: &str = "spec.json";
pub const INSTALL_ENV_FILE_NAME: &str = "install_environment.json";

#[derive(Clone, Debug, Deserialize)]
pub struct SpackSpec {
    pub spec: SpackSpecNodes,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SpackSpecNodes {
    pub nodes: Vec<SpackNode>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SpackNode {
    pub name: String,
    pub version: String,
    pub hash: String,
    #[serde(default)]
    pub dependencies: Vec<SpackDependency>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SpackDependency {
    pub name: String,
    pub hash: String,
}

/// The subset of `install_environment.json` we care about.
#[derive(Clone, Debug, Deserialize)]
pub struct InstallEnvironment {
    pub host_os: String,
    pub host_target: String,
}

/// # Description
///
/// Output of `compspec extract --name system` on the build host. The
/// document is kept untyped, and read through JSON pointers, as its sections
/// depend on the extractor version.
#[derive(Clone, Debug)]
pub struct HostSystem {
    doc: Value,
}

impl HostSystem {
    pub fn new(doc: Value) -> Self {
        HostSystem { doc }
    }

    fn section(&self, section: &str, key: &str) -> Result<&str> {
        // JSON pointers escape '/' as '~1', section keys may contain dots
        let pointer = format!(
            "/extractors/system/sections/{section}/{}",
            key.replace('~', "~0").replace('/', "~1")
        );
        self.doc
            .pointer(&pointer)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                let reason = format!("host system metadata is missing {pointer}");
                error!("{reason}");
                anyhow::anyhow!(reason)
            })
    }

    pub fn arch(&self) -> Result<&str> {
        self.section("arch", "name")
    }

    pub fn cpu_vendor(&self) -> Result<&str> {
        self.section("processor", "0.vendor")
    }

    pub fn os_release(&self) -> Result<&str> {
        self.section("os", "release")
    }

    pub fn os_vendor(&self) -> Result<&str> {
        self.section("os", "vendor")
    }
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = fs::read_to_string(path).map_err(|e| {
        let reason = format!("error reading file (path={}, error={e:?})", path.display());
        error!("{reason}");
        anyhow::anyhow!(reason)
    })?;

    serde_json::from_str(&contents).map_err(|e| {
        let reason = format!("error parsing json (path={}, error={e:?})", path.display());
        error!("{reason}");
        anyhow::anyhow!(reason)
    })
}

impl SpackSpec {
    fn root(&self) -> Result<&SpackNode> {
        self.spec.nodes.first().ok_or_else(|| {
            error!("spack spec has no nodes");
            anyhow::anyhow!("spack spec has no nodes")
        })
    }

    /// # Description
    ///
    /// Resolve the MPI provider the root package was built against: the first
    /// direct dependency with `mpi` in its name, looked up by hash.
    pub fn mpi(&self) -> Result<&SpackNode> {
        let root = self.root()?;
        let dep = root
            .dependencies
            .iter()
            .find(|dep| dep.name.contains("mpi"))
            .ok_or_else(|| {
                let reason = format!("no mpi dependency found (package={})", root.name);
                error!("{reason}");
                anyhow::anyhow!(reason)
            })?;

        self.spec
            .nodes
            .iter()
            .find(|node| node.hash == dep.hash)
            .ok_or_else(|| {
                let reason = format!(
                    "mpi dependency not in spec nodes (name={}, hash={})",
                    dep.name, dep.hash
                );
                error!("{reason}");
                anyhow::anyhow!(reason)
            })
    }

    /// Any CUDA node in the DAG means the binary needs a GPU.
    pub fn has_gpu(&self) -> bool {
        self.spec.nodes.iter().any(|node| node.name.contains("cuda"))
    }
}

/// # Description
///
/// Build the compatibility specification of a Spack install.
///
/// # Arguments
///
/// * `spack`: the parsed `spec.json` of the install.
/// * `environ`: the parsed `install_environment.json` of the install.
/// * `system`: the `compspec extract` output of the build host.
pub fn spec_from_spack_install(
    spack: &SpackSpec,
    environ: &InstallEnvironment,
    system: &HostSystem,
) -> Result<CompatibilitySpec> {
    let mut spec = CompatibilitySpec::lammps_prototype();

    spec.set_attribute(SUPERCONTAINERS, "os.name", environ.host_os.as_str());
    spec.set_attribute(SUPERCONTAINERS, "os.release", system.os_release()?);
    spec.set_attribute(SUPERCONTAINERS, "os.vendor", system.os_vendor()?);

    spec.set_attribute(ARCHSPEC, "cpu.target", system.arch()?);
    spec.set_attribute(ARCHSPEC, "cpu.model", environ.host_target.as_str());
    spec.set_attribute(ARCHSPEC, "cpu.vendor", system.cpu_vendor()?);

    let mpi = spack.mpi()?;
    spec.set_attribute(SUPERCONTAINERS, "mpi.implementation", mpi.name.as_str());
    spec.set_attribute(SUPERCONTAINERS, "mpi.version", mpi.version.as_str());

    let has_gpu = if spack.has_gpu() { "yes" } else { "no" };
    spec.set_attribute(SUPERCONTAINERS, "hardware.gpu.available", has_gpu);

    Ok(spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lammps_spack_spec(with_cuda: bool) -> SpackSpec {
        let mut nodes = json!([
            {
                "name": "lammps",
                "version": "20230802.2",
                "hash": "l75zzkprajipt5e5daomwfyxe3meus3q",
                "dependencies": [
                    {"name": "fftw", "hash": "aaa"},
                    {"name": "openmpi", "hash": "bbb"}
                ]
            },
            {"name": "fftw", "version": "3.3.10", "hash": "aaa"},
            {"name": "openmpi", "version": "4.1.2", "hash": "bbb"}
        ]);
        if with_cuda {
            nodes
                .as_array_mut()
                .unwrap()
                .push(json!({"name": "cuda", "version": "11.8.0", "hash": "ccc"}));
        }
        serde_json::from_value(json!({"spec": {"nodes": nodes}})).unwrap()
    }

    fn host_system() -> HostSystem {
        HostSystem::new(json!({
            "extractors": {
                "system": {
                    "sections": {
                        "arch": {"name": "amd64"},
                        "processor": {"0.vendor": "AuthenticAMD", "0.target": "zen2"},
                        "os": {"release": "8.9", "vendor": "rhel"}
                    }
                }
            }
        }))
    }

    #[test]
    fn test_spec_from_spack_install() {
        let environ = InstallEnvironment {
            host_os: "rhel8".to_string(),
            host_target: "zen2".to_string(),
        };
        let spec =
            spec_from_spack_install(&lammps_spack_spec(false), &environ, &host_system()).unwrap();

        assert_eq!(spec.attribute(SUPERCONTAINERS, "os.name"), Some("rhel8"));
        assert_eq!(spec.attribute(SUPERCONTAINERS, "os.release"), Some("8.9"));
        assert_eq!(spec.attribute(SUPERCONTAINERS, "os.vendor"), Some("rhel"));
        assert_eq!(spec.attribute(SUPERCONTAINERS, "os.version"), None);
        assert_eq!(spec.attribute(ARCHSPEC, "cpu.target"), Some("amd64"));
        assert_eq!(spec.attribute(ARCHSPEC, "cpu.model"), Some("zen2"));
        assert_eq!(spec.attribute(ARCHSPEC, "cpu.vendor"), Some("AuthenticAMD"));
        assert_eq!(
            spec.attribute(SUPERCONTAINERS, "mpi.implementation"),
            Some("openmpi")
        );
        assert_eq!(spec.attribute(SUPERCONTAINERS, "mpi.version"), Some("4.1.2"));
        assert_eq!(
            spec.attribute(SUPERCONTAINERS, "hardware.gpu.available"),
            Some("no")
        );
    }

    #[test]
    fn test_cuda_node_means_gpu() {
        assert!(lammps_spack_spec(true).has_gpu());
        assert!(!lammps_spack_spec(false).has_gpu());
    }

    #[test]
    fn test_missing_mpi_is_an_error() {
        let spack: SpackSpec = serde_json::from_value(json!({
            "spec": {"nodes": [{"name": "lammps", "version": "1", "hash": "x"}]}
        }))
        .unwrap();

        assert!(spack.mpi().is_err());
    }

    #[test]
    fn test_missing_host_section_is_an_error() {
        let system = HostSystem::new(json!({"extractors": {"system": {"sections": {}}}}));
        assert!(system.arch().is_err());
    }
}
