use crate::{
    env::Env,
    tasks::experiments::{
        color::{FONT_SIZE, get_color_from_label},
        modes::display_label,
        plot::{draw_group_labels, group_x, group_x_max},
    },
};
use anyhow::Result;
use clap::Args;
use compat_spec::{
    CompatibilitySpec,
    host::HostMetadata,
    select::{self, HostIndex, SimulationConfig, SimulationResults},
    spack::{
        HostSystem, INSTALL_ENV_FILE_NAME, InstallEnvironment, SPEC_FILE_NAME, SpackSpec,
        read_json, spec_from_spack_install,
    },
};
use log::{error, info};
use plotters::prelude::*;
use rand::{SeedableRng, rngs::StdRng};
use serde::Serialize;
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

#[derive(Debug, Args)]
pub struct SpackExtractArgs {
    /// Root of the Spack installation
    #[arg(long)]
    spack_root: Option<PathBuf>,
    /// Name of the package to extract metadata for
    #[arg(long)]
    package: Option<String>,
    /// Directory to write compatibility specs to
    #[arg(long)]
    outdir: Option<PathBuf>,
    /// Output of `compspec extract --name system` on this host
    #[arg(long)]
    host_compspec: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct SpackSimulateArgs {
    /// Directory with the compatibility specs of each binary
    #[arg(long)]
    specs_dir: Option<PathBuf>,
    /// Directory with the compspec metadata of each host
    #[arg(long)]
    hosts_dir: Option<PathBuf>,
    /// Directory to write simulation results to
    #[arg(long)]
    outdir: Option<PathBuf>,
    /// Number of selections per binary and mode
    #[arg(long, default_value = "20")]
    iters: u32,
    /// YAML file with ground truth and host groupings
    #[arg(long)]
    config: Option<PathBuf>,
    /// Seed for host selection
    #[arg(long)]
    seed: Option<u64>,
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| {
        let reason = format!(
            "error creating directory (path={}, error={e:?})",
            path.display()
        );
        error!("{reason}");
        anyhow::anyhow!(reason)
    })
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    fs::write(path, content).map_err(|e| {
        let reason = format!("error writing file (path={}, error={e:?})", path.display());
        error!("{reason}");
        anyhow::anyhow!(reason)
    })
}

/// All files under `dir` matching `filter`, in file name order.
fn find_files(dir: &Path, filter: impl Fn(&Path) -> bool) -> Result<Vec<PathBuf>> {
    let mut files = vec![];
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let reason = format!("error walking directory (path={}, error={e:?})", dir.display());
            error!("{reason}");
            anyhow::anyhow!(reason)
        })?;

        if entry.file_type().is_file() && filter(entry.path()) {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}

fn is_json(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("json")
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default()
}

// ------------------------------------------------------------------------
// Extract compatibility specs from a Spack installation
// ------------------------------------------------------------------------

/// # Description
///
/// Install prefixes under `<spack_root>/opt` of every install whose
/// `spec.json` path mentions `package`. Specs live at
/// `<prefix>/.spack/spec.json`.
pub fn find_install_prefixes(spack_root: &Path, package: &str) -> Result<Vec<PathBuf>> {
    let spec_files = find_files(&spack_root.join("opt"), |path| {
        file_name(path) == SPEC_FILE_NAME && path.to_string_lossy().contains(package)
    })?;

    Ok(spec_files
        .iter()
        .filter_map(|spec_file| spec_file.parent().and_then(Path::parent))
        .map(Path::to_path_buf)
        .collect())
}

pub fn extract(args: &SpackExtractArgs) -> Result<()> {
    let (Some(spack_root), Some(package)) = (&args.spack_root, &args.package) else {
        let reason = "a spack root (--spack-root) and package (--package) are required".to_string();
        error!("{reason}");
        anyhow::bail!(reason);
    };
    let spack_root = Env::expand_path(spack_root);

    let host_compspec = args
        .host_compspec
        .as_deref()
        .map(Env::expand_path)
        .unwrap_or_else(|| Env::spack_bare_metal_root().join("compspec-system.json"));
    if !host_compspec.exists() {
        let reason = format!(
            "please extract host metadata first: compspec extract --name system --out {}",
            host_compspec.display()
        );
        error!("{reason}");
        anyhow::bail!(reason);
    }

    let outdir = args
        .outdir
        .as_deref()
        .map(Env::expand_path)
        .unwrap_or_else(|| Env::spack_bare_metal_root().join("specs"));
    create_dir(&outdir)?;

    let system = HostSystem::new(read_json(&host_compspec)?);
    let prefixes = find_install_prefixes(&spack_root, package)?;
    info!("found {} installs for {package}", prefixes.len());

    for prefix in prefixes {
        let spack_dir = prefix.join(".spack");
        let spack: SpackSpec = read_json(&spack_dir.join(SPEC_FILE_NAME))?;
        let environ: InstallEnvironment = read_json(&spack_dir.join(INSTALL_ENV_FILE_NAME))?;

        let spec = spec_from_spack_install(&spack, &environ, &system)?;
        let out_file = outdir.join(format!("{}.json", file_name(&prefix)));
        write_file(&out_file, &spec.to_json_pretty()?)?;
        info!("wrote {}", out_file.display());
    }

    Ok(())
}

// ------------------------------------------------------------------------
// Simulate host selection
// ------------------------------------------------------------------------

pub fn load_specs(specs_dir: &Path) -> Result<BTreeMap<String, CompatibilitySpec>> {
    find_files(specs_dir, is_json)?
        .iter()
        .map(|path| -> Result<(String, CompatibilitySpec)> {
            Ok((file_name(path), CompatibilitySpec::from_path(path)?))
        })
        .collect()
}

pub fn load_hosts(hosts_dir: &Path, config: &SimulationConfig) -> Result<HostIndex> {
    let mut index = HostIndex::new(config);
    for path in find_files(hosts_dir, is_json)? {
        let hostname = HostMetadata::hostname_from_file_name(&file_name(&path));
        let host = HostMetadata::new(read_json(&path)?);
        index.add_host(&hostname, &host)?;
    }

    Ok(index)
}

fn load_config(config: Option<&Path>) -> Result<SimulationConfig> {
    let default_path = Env::config_root().join("simulation.yaml");
    match config {
        Some(path) => SimulationConfig::from_path(&Env::expand_path(path)),
        None if default_path.exists() => SimulationConfig::from_path(&default_path),
        None => Ok(SimulationConfig::default()),
    }
}

pub fn simulate(args: &SpackSimulateArgs) -> Result<()> {
    let root = Env::spack_bare_metal_root();
    let specs_dir = args
        .specs_dir
        .as_deref()
        .map(Env::expand_path)
        .unwrap_or_else(|| root.join("specs"));
    let hosts_dir = args
        .hosts_dir
        .as_deref()
        .map(Env::expand_path)
        .unwrap_or_else(|| root.join("hosts"));
    let outdir = args
        .outdir
        .as_deref()
        .map(Env::expand_path)
        .unwrap_or_else(|| root.join("results"));

    for dir in [&specs_dir, &hosts_dir] {
        if !dir.is_dir() {
            let reason = format!("input directory does not exist (path={})", dir.display());
            error!("{reason}");
            anyhow::bail!(reason);
        }
    }
    create_dir(&outdir)?;
    info!("output directory: {}", outdir.display());

    let config = load_config(args.config.as_deref())?;
    let specs = load_specs(&specs_dir)?;
    let index = load_hosts(&hosts_dir, &config)?;

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let results = select::simulate(&specs, &index, &config.truth, args.iters, &mut rng)?;

    let results_file = outdir.join("simulation-results.json");
    write_file(&results_file, &serde_json::to_string_pretty(&results)?)?;
    info!("simulation is finished, see output in {}", results_file.display());

    Ok(())
}

// ------------------------------------------------------------------------
// Plot simulation results
// ------------------------------------------------------------------------

#[derive(Debug, Serialize, PartialEq)]
pub struct SimulationRow {
    pub needed: String,
    pub choice: Option<String>,
    pub correct: bool,
    pub binary: String,
    pub experiment: String,
}

/// One row per selection.
pub fn flatten_results(results: &SimulationResults) -> Vec<SimulationRow> {
    results
        .iter()
        .flat_map(|(experiment, binaries)| {
            binaries.iter().flat_map(move |(binary, outcomes)| {
                outcomes.iter().map(move |outcome| SimulationRow {
                    needed: outcome.needed.clone(),
                    choice: outcome.selected.clone(),
                    correct: outcome.correct,
                    binary: binary.clone(),
                    experiment: experiment.clone(),
                })
            })
        })
        .collect()
}

fn plot_accuracy(levels: &BTreeMap<String, f64>, plot_path: &Path) -> Result<()> {
    // Least to most descriptive
    let modes: Vec<String> = select::SimulationMode::iter_variants()
        .map(|mode| mode.to_string())
        .filter(|mode| levels.contains_key(mode))
        .collect();
    let labels: Vec<String> = modes.iter().map(|mode| display_label(mode)).collect();
    let labels: Vec<&str> = labels.iter().map(String::as_str).collect();

    let root = SVGBackend::new(plot_path, (600, 400)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .margin(10)
        .margin_top(20)
        .build_cartesian_2d(-0.5..group_x_max(modes.len(), 1), 0f64..1.05)?;

    chart
        .configure_mesh()
        .light_line_style(WHITE)
        .y_labels(6)
        .y_label_style(("sans-serif", FONT_SIZE).into_font())
        .y_desc("Accuracy")
        .x_label_formatter(&|_| String::new())
        .disable_x_mesh()
        .y_label_formatter(&|y| format!("{:.1}", y))
        .draw()?;

    for (idx, (mode, label)) in modes.iter().zip(&labels).enumerate() {
        let accuracy = levels.get(mode).copied().unwrap_or(0.0);
        let x = group_x(idx, 0, 1);
        chart.draw_series(std::iter::once(Rectangle::new(
            [(x, 0.0), (x + 1.0, accuracy)],
            get_color_from_label(label)?.filled(),
        )))?;
        chart.draw_series(std::iter::once(PathElement::new(
            vec![
                (x, 0.0),
                (x + 1.0, 0.0),
                (x + 1.0, accuracy),
                (x, accuracy),
                (x, 0.0),
            ],
            BLACK,
        )))?;
    }

    draw_group_labels(&root, &chart, &labels, 1)?;
    root.present()?;

    info!("plot available at: {}", plot_path.display());
    Ok(())
}

/// # Description
///
/// Flatten `simulation-results.json` into `simulation-results.csv`, log the
/// accuracy of every mode, and plot it.
pub fn plot(results: &Path, out: &Path) -> Result<()> {
    create_dir(out)?;

    let raw: SimulationResults = read_json(results)?;
    let rows = flatten_results(&raw);

    let csv_path = out.join("simulation-results.csv");
    let mut writer = csv::Writer::from_path(&csv_path).map_err(|e| {
        let reason = format!(
            "error creating csv (path={}, error={e:?})",
            csv_path.display()
        );
        error!("{reason}");
        anyhow::anyhow!(reason)
    })?;
    for row in &rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    let levels = select::accuracy(&raw);
    for (mode, accuracy) in &levels {
        info!("{mode}: accuracy {accuracy:.3}");
    }

    plot_accuracy(&levels, &out.join("simulation-accuracy.svg"))
}
