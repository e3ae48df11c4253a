use crate::env::Env;
use anyhow::Result;
use log::{debug, error, info};
use std::{
    env,
    path::{Path, PathBuf},
    process::Command,
};

/// Marker `compspec match` prints once it has selected an image.
const FOUND_MATCHES: &str = "Found matches";

pub struct Compspec {}

impl Compspec {
    fn get_compspec_cmd() -> String {
        env::var("EXPCTL_COMPSPEC").unwrap_or_else(|_| "compspec".to_string())
    }

    fn find_in_path(binary: &str) -> Option<PathBuf> {
        let binary_path = Path::new(binary);
        if binary_path.components().count() > 1 {
            return binary_path.is_file().then(|| binary_path.to_path_buf());
        }

        env::var_os("PATH").and_then(|paths| {
            env::split_paths(&paths)
                .map(|dir| dir.join(binary))
                .find(|candidate| candidate.is_file())
        })
    }

    /// Fail early if the `compspec` binary can not be found.
    pub fn check_available() -> Result<PathBuf> {
        let cmd = Self::get_compspec_cmd();
        match Self::find_in_path(&cmd) {
            Some(path) => {
                debug!("{}(compspec): using {}", Env::SYS_NAME, path.display());
                Ok(path)
            }
            None => {
                let reason = format!("compspec binary not found in PATH (binary={cmd})");
                error!("{reason}");
                anyhow::bail!(reason);
            }
        }
    }

    /// Pick the image out of the output of `compspec match --single`.
    pub fn parse_match_output(output: &str) -> Result<String> {
        if !output.contains(FOUND_MATCHES) {
            let reason = format!("compspec did not find any matches (output={output})");
            error!("{reason}");
            anyhow::bail!(reason);
        }

        output
            .lines()
            .map(str::trim)
            .rfind(|line| !line.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                let reason = "compspec output has no image".to_string();
                error!("{reason}");
                anyhow::anyhow!(reason)
            })
    }

    /// # Description
    ///
    /// Ask `compspec` for a single random image out of `manifests` that
    /// satisfies every `key=value` pair in `matches`.
    pub fn match_image(
        manifests: &Path,
        cache: &Path,
        matches: &[(String, String)],
    ) -> Result<String> {
        let mut args: Vec<String> = vec![
            "match".to_string(),
            "-i".to_string(),
            manifests.display().to_string(),
            "--cache".to_string(),
            cache.display().to_string(),
        ];
        for (key, value) in matches {
            args.push("--match".to_string());
            args.push(format!("{key}={value}"));
        }
        args.push("--single".to_string());
        args.push("--randomize".to_string());

        let cmd = Self::get_compspec_cmd();
        info!("{cmd} {}", shell_words::join(&args));

        let output = Command::new(&cmd).args(&args).output().map_err(|e| {
            let reason = format!("failed to execute compspec (binary={cmd}, error={e:?})");
            error!("{reason}");
            anyhow::anyhow!(reason)
        })?;

        if !output.status.success() {
            let reason = format!(
                "compspec match failed (code={:?}, stderr={})",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr)
            );
            error!("{reason}");
            anyhow::bail!(reason);
        }

        Self::parse_match_output(&String::from_utf8_lossy(&output.stdout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_match_output() {
        let output = "\
⭐️ Found matches!
ghcr.io/rse-ops/lammps-matrix:mpich-ubuntu-20.04-amd64

";
        assert_eq!(
            Compspec::parse_match_output(output).unwrap(),
            "ghcr.io/rse-ops/lammps-matrix:mpich-ubuntu-20.04-amd64"
        );
    }

    #[test]
    fn test_parse_match_output_without_matches() {
        assert!(Compspec::parse_match_output("No matches found\n").is_err());
    }

    #[test]
    fn test_find_in_path_with_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let binary = dir.path().join("compspec");
        std::fs::write(&binary, "#!/bin/sh\n").unwrap();

        let found = Compspec::find_in_path(binary.to_str().unwrap()).unwrap();
        assert_eq!(found, binary);
        assert!(Compspec::find_in_path(dir.path().join("missing").to_str().unwrap()).is_none());
    }
}
