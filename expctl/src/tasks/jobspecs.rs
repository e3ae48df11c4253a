use crate::env::Env;
use anyhow::Result;
use clap::Args;
use compat_spec::{CompatibilitySpec, jobspec::Jobspec, levels::CompatibilityLevel};
use log::{error, info};
use regex::Regex;
use std::{
    fs,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

const COMPSPEC_FILE_PATTERN: &str = ".+compspec[.]json";

#[derive(Debug, Args)]
pub struct JobspecsGenerateArgs {
    /// Input directory with *compspec.json files
    #[arg(long)]
    indir: Option<PathBuf>,
    /// Output directory for jobspecs
    #[arg(long)]
    outdir: Option<PathBuf>,
    /// Number of nodes the application will run on
    #[arg(long, default_value = "2")]
    nodes: u32,
    /// Number of tasks (processes) the application will need
    #[arg(long, default_value = "4")]
    tasks: u32,
}

/// The LAMMPS command line for a compatibility spec file.
pub fn lammps_command(input_file: &Path) -> Vec<String> {
    let executable = if input_file.to_string_lossy().contains("gpu") {
        "lmp_gpu"
    } else {
        "lmp"
    };

    [
        executable,
        "-v",
        "x",
        "2",
        "-v",
        "y",
        "2",
        "-v",
        "z",
        "2",
        "-in",
        "./in.reaxff.hns",
        "-nocite",
    ]
    .iter()
    .map(|arg| arg.to_string())
    .collect()
}

/// `lammps-amd64-compspec.json` becomes `lammps-amd64-jobspec.yaml`.
pub fn jobspec_file_name(input_file: &Path) -> String {
    input_file
        .file_name()
        .map(|name| name.to_string_lossy().replace("-compspec.json", "-jobspec.yaml"))
        .unwrap_or_default()
}

pub fn find_compspecs(indir: &Path) -> Result<Vec<PathBuf>> {
    let pattern = Regex::new(COMPSPEC_FILE_PATTERN)?;

    let mut files = vec![];
    for entry in WalkDir::new(indir).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let reason = format!(
                "error walking directory (path={}, error={e:?})",
                indir.display()
            );
            error!("{reason}");
            anyhow::anyhow!(reason)
        })?;

        if entry.file_type().is_file() && pattern.is_match(&entry.file_name().to_string_lossy()) {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}

/// # Description
///
/// Write one jobspec per compatibility level for every compatibility spec
/// found under the input directory, to `<outdir>/<level>/`.
pub fn generate(args: &JobspecsGenerateArgs) -> Result<()> {
    let indir = args
        .indir
        .as_deref()
        .map(Env::expand_path)
        .unwrap_or_else(|| Env::scheduler_root().join("compspec"));
    let outdir = args
        .outdir
        .as_deref()
        .map(Env::expand_path)
        .unwrap_or_else(|| Env::scheduler_root().join("jobspecs"));

    info!("output directory: {}", outdir.display());
    info!(" input directory: {}", indir.display());

    for input_file in find_compspecs(&indir)? {
        let spec = CompatibilitySpec::from_path(&input_file)?;
        let command = lammps_command(&input_file);

        for level in CompatibilityLevel::iter_variants() {
            let jobspec = Jobspec::from_compatibility_spec(
                &spec,
                &command,
                args.nodes,
                args.tasks,
                &format!("lammps-{level}"),
                *level,
            );

            let level_dir = outdir.join(level.to_string());
            fs::create_dir_all(&level_dir).map_err(|e| {
                let reason = format!(
                    "error creating directory (path={}, error={e:?})",
                    level_dir.display()
                );
                error!("{reason}");
                anyhow::anyhow!(reason)
            })?;

            let out_file = level_dir.join(jobspec_file_name(&input_file));
            info!("writing {level} jobspec {}", out_file.display());
            fs::write(&out_file, jobspec.to_yaml()?).map_err(|e| {
                let reason = format!(
                    "error writing jobspec (path={}, error={e:?})",
                    out_file.display()
                );
                error!("{reason}");
                anyhow::anyhow!(reason)
            })?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use compat_spec::{ARCHSPEC, SUPERCONTAINERS};

    #[test]
    fn test_lammps_command() {
        let command = lammps_command(Path::new("specs/lammps-gpu-compspec.json"));
        assert_eq!(command[0], "lmp_gpu");
        assert_eq!(command.len(), 13);
        assert_eq!(command.last().map(String::as_str), Some("-nocite"));

        let command = lammps_command(Path::new("specs/lammps-compspec.json"));
        assert_eq!(command[0], "lmp");
    }

    #[test]
    fn test_jobspec_file_name() {
        assert_eq!(
            jobspec_file_name(Path::new("/in/lammps-amd64-compspec.json")),
            "lammps-amd64-jobspec.yaml"
        );
    }

    #[test]
    fn test_generate_writes_every_level() {
        let indir = tempfile::tempdir().unwrap();
        let outdir = tempfile::tempdir().unwrap();

        let mut spec = CompatibilitySpec::lammps_prototype();
        spec.set_attribute(ARCHSPEC, "cpu.target", "amd64");
        spec.set_attribute(SUPERCONTAINERS, "os.vendor", "ubuntu");
        fs::write(
            indir.path().join("lammps-amd64-compspec.json"),
            spec.to_json_pretty().unwrap(),
        )
        .unwrap();
        // Needs something before "compspec"
        fs::write(indir.path().join("compspec.json"), "{}").unwrap();

        let args = JobspecsGenerateArgs {
            indir: Some(indir.path().to_path_buf()),
            outdir: Some(outdir.path().to_path_buf()),
            nodes: 2,
            tasks: 4,
        };
        generate(&args).unwrap();

        for level in CompatibilityLevel::iter_variants() {
            let path = outdir
                .path()
                .join(level.to_string())
                .join("lammps-amd64-jobspec.yaml");
            let jobspec: Jobspec =
                serde_yaml::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
            assert_eq!(jobspec.attributes.system.job.name, format!("lammps-{level}"));
        }
    }
}
