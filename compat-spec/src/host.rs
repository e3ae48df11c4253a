use anyhow::Result;
use log::error;
use serde_json::Value;

/// # Description
///
/// Compatibility metadata extracted from a host with `compspec extract`.
///
/// Depending on the extractor version, the library extractor nests its
/// results under a `sections` key or not, so both layouts are accepted.
#[derive(Clone, Debug)]
pub struct HostMetadata {
    doc: Value,
}

fn escape(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}

impl HostMetadata {
    pub fn new(doc: Value) -> Self {
        HostMetadata { doc }
    }

    /// Host name for a metadata file name (e.g. `compspec-corona.json`).
    pub fn hostname_from_file_name(file_name: &str) -> String {
        file_name.replace(".json", "").replace("compspec-", "")
    }

    fn lookup(&self, path: &[&str]) -> Result<&str> {
        let pointer: String = path.iter().map(|p| format!("/{}", escape(p))).collect();
        self.doc
            .pointer(&pointer)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                let reason = format!("host metadata is missing {pointer}");
                error!("{reason}");
                anyhow::anyhow!(reason)
            })
    }

    pub fn platform(&self) -> Result<&str> {
        self.lookup(&["results", "system", "sections", "arch", "name"])
    }

    pub fn os_name(&self) -> Result<&str> {
        self.lookup(&["results", "nfd", "sections", "system", "osrelease.ID"])
    }

    pub fn os_version(&self) -> Result<&str> {
        self.lookup(&["results", "nfd", "sections", "system", "osrelease.VERSION_ID"])
    }

    fn mpi(&self, key: &str) -> Result<&str> {
        if self.doc.pointer("/results/library/sections").is_some() {
            self.lookup(&["results", "library", "sections", "mpi", key])
        } else {
            self.lookup(&["results", "library", "mpi", key])
        }
    }

    pub fn mpi_variant(&self) -> Result<&str> {
        self.mpi("variant")
    }

    pub fn mpi_version(&self) -> Result<&str> {
        self.mpi("version")
    }
}
