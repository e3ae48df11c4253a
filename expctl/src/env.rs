use std::path::{Path, PathBuf};

pub struct Env {}

impl Env {
    pub const SYS_NAME: &'static str = "expctl";

    pub fn proj_root() -> PathBuf {
        env!("EXPCTL_ROOT_DIR").into()
    }

    pub fn config_root() -> PathBuf {
        let mut path = Self::proj_root();
        path.push("config");
        path
    }

    pub fn crd_root() -> PathBuf {
        let mut path = Self::config_root();
        path.push("crd");
        path
    }

    pub fn experiments_root() -> PathBuf {
        let mut path = Self::proj_root();
        path.push("experiments");
        path
    }

    pub fn flux_operator_root() -> PathBuf {
        Self::experiments_root().join("flux-operator")
    }

    pub fn spack_bare_metal_root() -> PathBuf {
        Self::experiments_root().join("spack-bare-metal")
    }

    pub fn scheduler_root() -> PathBuf {
        Self::experiments_root().join("scheduler")
    }

    /// Expand a leading `~` in a user-provided path.
    pub fn expand_path(path: &Path) -> PathBuf {
        let path_str = path.to_string_lossy();
        PathBuf::from(shellexpand::tilde(&path_str).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roots_are_nested() {
        assert!(Env::crd_root().starts_with(Env::proj_root()));
        assert!(Env::flux_operator_root().ends_with("experiments/flux-operator"));
        assert!(Env::spack_bare_metal_root().ends_with("experiments/spack-bare-metal"));
    }

    #[test]
    fn test_expand_path_keeps_plain_paths() {
        assert_eq!(
            Env::expand_path(Path::new("/tmp/results")),
            PathBuf::from("/tmp/results")
        );
    }
}
