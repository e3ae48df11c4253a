use crate::{
    env::Env,
    tasks::{
        compspec::Compspec,
        experiments::modes::{Platform, SelectionMode},
        kubectl,
    },
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, info};
use rand::{Rng, SeedableRng, rngs::StdRng, seq::SliceRandom};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    io::{self, BufRead, Write},
    path::{Path, PathBuf},
};

const NAMESPACE: &str = "default";
const LAMMPS_SIX_NAME: &str = "lammps-six";

const ROCKY_VIEWS: [&str; 2] = [
    "ghcr.io/converged-computing/flux-view-rocky:tag-8",
    "ghcr.io/converged-computing/flux-view-rocky:tag-9",
];
const UBUNTU_VIEWS: [&str; 2] = [
    "ghcr.io/converged-computing/flux-view-ubuntu:tag-focal",
    "ghcr.io/converged-computing/flux-view-ubuntu:tag-jammy",
];

const OS_VENDOR_LABEL: &str = "org.supercontainers.os.vendor";
const OS_VERSION_LABEL: &str = "org.supercontainers.os.version";
const GPU_LABEL: &str = "org.supercontainers.hardware.gpu.available";
const PLATFORM_LABEL: &str = "io.archspec.cpu.target";

/// Intel MPI images need their environment sourced before running.
const INTEL_MPI_ENV: &str = ". /opt/intel/mpi/latest/env/vars.sh";

#[derive(Debug, Args)]
pub struct LammpsRunArgs {
    /// Name of the experiment configuration
    #[arg(long, default_value = LAMMPS_SIX_NAME)]
    config_name: String,
    /// Number of iterations to run
    #[arg(long, default_value = "10")]
    iters: u32,
    /// Path to the manifests.yaml with the image listing
    #[arg(long)]
    manifests: Option<PathBuf>,
    /// Platform of the cluster nodes
    #[arg(long, value_enum, default_value_t = Platform::Amd64)]
    platform: Platform,
    /// How images are selected for the nodes
    #[arg(long, value_enum, default_value_t = SelectionMode::Basic)]
    mode: SelectionMode,
    /// Request GPU images (only in descriptive mode)
    #[arg(long, default_value_t = false)]
    gpu: bool,
    /// Directory to write results to
    #[arg(long)]
    outdir: Option<PathBuf>,
    /// Seed for image selection
    #[arg(long)]
    seed: Option<u64>,
    /// Do not ask for confirmation before starting
    #[arg(long, default_value_t = false)]
    yes: bool,
}

/// One MiniCluster shape of an experiment.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct LammpsConfig {
    pub x: u32,
    pub y: u32,
    pub z: u32,
    pub cpu_limit: u32,
    pub tasks: u32,
    pub size: u32,
}

pub struct ExperimentConfig {
    pub configs: Vec<LammpsConfig>,
    pub template: PathBuf,
}

pub fn get_experiment_config(name: &str) -> Option<ExperimentConfig> {
    match name {
        LAMMPS_SIX_NAME => Some(ExperimentConfig {
            configs: vec![LammpsConfig {
                x: 2,
                y: 2,
                z: 2,
                cpu_limit: 2,
                tasks: 4,
                size: 2,
            }],
            template: Env::crd_root().join("lammps.yaml"),
        }),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct ManifestImage {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Manifests {
    images: Option<Vec<ManifestImage>>,
}

/// # Description
///
/// Group the images of a `manifests.yaml` by platform. We can only do this
/// because the platform is part of every image name.
pub fn organize_manifests(yaml: &str) -> Result<BTreeMap<Platform, Vec<String>>> {
    let manifests: Manifests = serde_yaml::from_str(yaml).map_err(|e| {
        let reason = format!("error parsing manifests (error={e:?})");
        error!("{reason}");
        anyhow::anyhow!(reason)
    })?;

    let images = manifests.images.ok_or_else(|| {
        let reason = "expected to find 'images' key in manifests list".to_string();
        error!("{reason}");
        anyhow::anyhow!(reason)
    })?;

    let mut organized = BTreeMap::from([(Platform::Amd64, vec![]), (Platform::Arm64, vec![])]);
    for image in images {
        organized
            .entry(Platform::from_image_name(&image.name))
            .or_default()
            .push(image.name);
    }

    Ok(organized)
}

/// A flux view image together with the OS labels an application image must
/// carry to run on top of it.
#[derive(Clone, Debug, PartialEq)]
pub struct FluxViewRequest {
    pub image: String,
    pub matches: Vec<(String, String)>,
}

pub fn flux_view_requests(platform: Platform) -> Vec<FluxViewRequest> {
    let prefix = match platform {
        Platform::Amd64 => "tag",
        Platform::Arm64 => "arm",
    };

    [
        ("rocky", "9", "rocky", "9.3"),
        ("rocky", "8", "rocky", "8.9"),
        ("ubuntu", "focal", "ubuntu", "20.04"),
        ("ubuntu", "jammy", "ubuntu", "22.04"),
    ]
    .iter()
    .map(|(view, tag, vendor, version)| FluxViewRequest {
        image: format!("ghcr.io/converged-computing/flux-view-{view}:{prefix}-{tag}"),
        matches: vec![
            (OS_VENDOR_LABEL.to_string(), vendor.to_string()),
            (OS_VERSION_LABEL.to_string(), version.to_string()),
        ],
    })
    .collect()
}

/// Values substituted into the MiniCluster template.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct RenderParams {
    pub name: String,
    pub image: String,
    pub executable: String,
    pub flux_container: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(flatten)]
    pub config: LammpsConfig,
}

impl RenderParams {
    fn new(cfg: &LammpsConfig, name: &str, image: &str, flux_container: &str) -> Self {
        let executable = if image.contains("gpu") { "lmp_gpu" } else { "lmp" };

        RenderParams {
            name: name.to_string(),
            image: image.to_string(),
            executable: executable.to_string(),
            flux_container: flux_container.to_string(),
            command: None,
            config: cfg.clone(),
        }
    }

    pub fn env_vars(&self) -> BTreeMap<&'static str, String> {
        BTreeMap::from([
            ("NAME", self.name.clone()),
            ("IMAGE", self.image.clone()),
            ("EXECUTABLE", self.executable.clone()),
            ("FLUX_CONTAINER", self.flux_container.clone()),
            ("COMMAND", self.command.clone().unwrap_or_default()),
            ("X", self.config.x.to_string()),
            ("Y", self.config.y.to_string()),
            ("Z", self.config.z.to_string()),
            ("CPU_LIMIT", self.config.cpu_limit.to_string()),
            ("TASKS", self.config.tasks.to_string()),
            ("SIZE", self.config.size.to_string()),
        ])
    }
}

fn choose<'a, R: Rng + ?Sized>(items: &'a [String], rng: &mut R) -> Result<&'a String> {
    items.choose(rng).ok_or_else(|| {
        let reason = "no images to choose from for the requested platform".to_string();
        error!("{reason}");
        anyhow::anyhow!(reason)
    })
}

/// Flux view an image runs on when we pick it knowing its OS and version.
pub fn flux_view_for_version(image: &str) -> &'static str {
    if image.contains("ubuntu") && image.contains("20.04") {
        UBUNTU_VIEWS[0]
    } else if image.contains("ubuntu") {
        UBUNTU_VIEWS[1]
    } else if image.contains("rocky") && image.contains("-8-") {
        ROCKY_VIEWS[0]
    } else {
        ROCKY_VIEWS[1]
    }
}

/// # Description
///
/// Render parameters for the modes that select an image from its name:
/// `basic` always uses the ubuntu jammy view, `platform` a random view with
/// the image's OS, and `platform-version` the view with the image's OS and
/// version.
pub fn render_from_images<R: Rng + ?Sized>(
    mode: SelectionMode,
    images: &[String],
    cfg: &LammpsConfig,
    name: &str,
    rng: &mut R,
) -> Result<RenderParams> {
    let image = choose(images, rng)?;
    info!("selected image {image}");

    let flux_container = match mode {
        SelectionMode::Basic => UBUNTU_VIEWS[1],
        SelectionMode::Platform => {
            let views = if image.contains("ubuntu") {
                &UBUNTU_VIEWS
            } else {
                &ROCKY_VIEWS
            };
            views.choose(rng).copied().unwrap_or(views[0])
        }
        SelectionMode::PlatformVersion => flux_view_for_version(image),
        SelectionMode::DescriptiveBasic => {
            let reason = format!("mode is selected by compspec (mode={mode})");
            error!("{reason}");
            anyhow::bail!(reason);
        }
    };

    Ok(RenderParams::new(cfg, name, image, flux_container))
}

/// Labels `compspec` must find on an image to run on `request`.
pub fn descriptive_matches(
    request: &FluxViewRequest,
    platform: Platform,
    gpu: bool,
) -> Vec<(String, String)> {
    let mut matches = request.matches.clone();
    let gpu = if gpu { "yes" } else { "no" };
    matches.push((GPU_LABEL.to_string(), gpu.to_string()));
    matches.push((PLATFORM_LABEL.to_string(), platform.to_string()));
    matches
}

/// Render parameters once `compspec` has picked `image` for `request`.
pub fn render_descriptive(
    cfg: &LammpsConfig,
    name: &str,
    image: &str,
    request: &FluxViewRequest,
    gpu: bool,
) -> RenderParams {
    let mut render = RenderParams::new(cfg, name, image, &request.image);
    render.executable = if gpu { "lmp_gpu" } else { "lmp" }.to_string();
    if image.contains("intel") {
        render.command = Some(INTEL_MPI_ENV.to_string());
    }

    render
}

#[derive(Debug, Serialize)]
pub struct RunSpec {
    pub params: RenderParams,
    pub iter: u32,
    pub total_wrapped_time: i64,
}

fn confirm_action<R: BufRead>(question: &str, input: R) -> Result<bool> {
    print!("{question} (yes/no)? ");
    io::stdout().flush()?;

    for line in input.lines() {
        let answer = line?.trim().to_lowercase();
        match answer.chars().next() {
            Some('y') => return Ok(true),
            Some('n') => return Ok(false),
            _ => {
                print!("Please answer yes or no: ");
                io::stdout().flush()?;
            }
        }
    }

    Ok(false)
}

/// Fail unless the user agrees to start, or `yes` skips the question.
fn ensure_confirmed<R: BufRead>(yes: bool, input: R) -> Result<()> {
    if yes || confirm_action("Would you like to continue", input)? {
        return Ok(());
    }

    let reason = "cancelled!".to_string();
    error!("{reason}");
    anyhow::bail!(reason)
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    fs::write(path, content).map_err(|e| {
        let reason = format!("error writing file (path={}, error={e:?})", path.display());
        error!("{reason}");
        anyhow::anyhow!(reason)
    })
}

fn get_progress_bar(num_runs: u64, mode: &SelectionMode, config_name: &str) -> ProgressBar {
    let pb = ProgressBar::new(num_runs);
    if let Ok(style) =
        ProgressStyle::default_bar().template("{msg} [{bar:40.cyan/blue}] {pos}/{len} ({percent}%)")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_message(format!("{config_name}/{mode}"));
    pb
}

/// Submit one MiniCluster, wait for its leader to finish, and keep its log.
fn run_minicluster(minicluster_yaml: &str, render: &RenderParams, log_dir: &Path) -> Result<i64> {
    let start_time: DateTime<Utc> = Utc::now();
    kubectl::apply_manifest(minicluster_yaml)?;

    let pods = kubectl::wait_for_pods(NAMESPACE, &render.name, render.config.size as usize)?;
    let leader = kubectl::leader_pod(&pods, &render.name).ok_or_else(|| {
        let reason = format!("no leader pod for minicluster (name={})", render.name);
        error!("{reason}");
        anyhow::anyhow!(reason)
    })?;
    info!("found minicluster leader pod {} to watch", leader.name);

    let log = kubectl::wait_for_logs(NAMESPACE, &leader.name)?;
    write_file(&log_dir.join(format!("{}.log", render.name)), &log)?;
    let end_time: DateTime<Utc> = Utc::now();

    kubectl::delete_minicluster(&render.name)?;

    Ok((end_time - start_time).num_seconds())
}

/// # Description
///
/// Run a LAMMPS experiment on the current Kubernetes cluster. Every
/// iteration creates one MiniCluster per configuration, waits for it to
/// finish, saves the lead broker's log, and deletes it again.
pub fn run(args: &LammpsRunArgs) -> Result<()> {
    let experiment = get_experiment_config(&args.config_name).ok_or_else(|| {
        let reason = format!("unknown configuration (name={})", args.config_name);
        error!("{reason}");
        anyhow::anyhow!(reason)
    })?;

    if !experiment.template.exists() {
        let reason = format!(
            "template does not exist (path={})",
            experiment.template.display()
        );
        error!("{reason}");
        anyhow::bail!(reason);
    }

    let manifests_path = match &args.manifests {
        Some(path) if Env::expand_path(path).exists() => Env::expand_path(path),
        _ => {
            let reason = "manifests.yaml must be defined and exist".to_string();
            error!("{reason}");
            anyhow::bail!(reason);
        }
    };

    if args.mode == SelectionMode::DescriptiveBasic {
        Compspec::check_available()?;
    }

    let outdir = args
        .outdir
        .as_deref()
        .map(Env::expand_path)
        .unwrap_or_else(|| Env::flux_operator_root().join("results"))
        .join(args.mode.to_string());
    let log_dir = outdir.join("logs");
    fs::create_dir_all(&log_dir).map_err(|e| {
        let reason = format!(
            "error creating directory (path={}, error={e:?})",
            log_dir.display()
        );
        error!("{reason}");
        anyhow::anyhow!(reason)
    })?;

    info!("output directory: {}", outdir.display());
    info!("     config name: {}", args.config_name);
    info!("      iterations: {}", args.iters);
    info!("            mode: {}", args.mode);
    info!("        platform: {}", args.platform);

    ensure_confirmed(args.yes, io::stdin().lock())?;

    kubectl::save_nodes(&outdir.join("topology.json"))?;

    let manifests = organize_manifests(&fs::read_to_string(&manifests_path)?)?;
    let images = manifests.get(&args.platform).cloned().unwrap_or_default();
    let cache_path = outdir.join("cache");

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut specs: Vec<RunSpec> = vec![];
    let pb = get_progress_bar(
        (args.iters as usize * experiment.configs.len()) as u64,
        &args.mode,
        &args.config_name,
    );
    for iter in 0..args.iters {
        for cfg in &experiment.configs {
            let name = format!("lammps-{iter}-size-{}", cfg.size);

            let render = match args.mode {
                SelectionMode::DescriptiveBasic => {
                    let requests = flux_view_requests(args.platform);
                    let request = requests.choose(&mut rng).ok_or_else(|| {
                        anyhow::anyhow!("no flux view requests (platform={})", args.platform)
                    })?;
                    info!("selected flux view is {}", request.image);

                    fs::create_dir_all(&cache_path)?;
                    let matches = descriptive_matches(request, args.platform, args.gpu);
                    let image = Compspec::match_image(&manifests_path, &cache_path, &matches)?;
                    info!("compspec has selected {image}");

                    render_descriptive(cfg, &name, &image, request, args.gpu)
                }
                mode => render_from_images(mode, &images, cfg, &name, &mut rng)?,
            };

            let minicluster_yaml = kubectl::template_yaml(&experiment.template, &render.env_vars())?;
            debug!("{minicluster_yaml}");
            write_file(
                &log_dir.join(format!("minicluster-{name}.yaml")),
                &minicluster_yaml,
            )?;

            let total_wrapped_time = run_minicluster(&minicluster_yaml, &render, &log_dir)?;
            specs.push(RunSpec {
                params: render,
                iter,
                total_wrapped_time,
            });
            pb.inc(1);
        }
    }
    pb.finish();

    write_file(
        &outdir.join("specs.json"),
        &serde_json::to_string_pretty(&specs)?,
    )?;
    info!("experiments are finished, see output in {}", outdir.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> LammpsConfig {
        get_experiment_config(LAMMPS_SIX_NAME).unwrap().configs[0].clone()
    }

    fn images() -> Vec<String> {
        [
            "ghcr.io/rse-ops/lammps-matrix:mpich-ubuntu-20.04-amd64",
            "ghcr.io/rse-ops/lammps-matrix:openmpi-ubuntu-gpu-22.04-amd64",
            "ghcr.io/rse-ops/lammps-matrix:intel-mpi-rocky-8-amd64",
            "ghcr.io/rse-ops/lammps-matrix:openmpi-rocky-9-arm",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    #[test]
    fn test_organize_manifests() {
        let yaml = images()
            .iter()
            .fold("images:\n".to_string(), |acc, name| {
                format!("{acc}  - name: {name}\n")
            });

        let organized = organize_manifests(&yaml).unwrap();
        assert_eq!(organized[&Platform::Amd64].len(), 3);
        assert_eq!(organized[&Platform::Arm64].len(), 1);
    }

    #[test]
    fn test_organize_manifests_requires_images() {
        assert!(organize_manifests("other: []\n").is_err());
    }

    #[test]
    fn test_flux_view_requests() {
        let amd = flux_view_requests(Platform::Amd64);
        assert_eq!(amd.len(), 4);
        assert_eq!(amd[0].image, "ghcr.io/converged-computing/flux-view-rocky:tag-9");
        assert_eq!(
            amd[2].matches,
            vec![
                (OS_VENDOR_LABEL.to_string(), "ubuntu".to_string()),
                (OS_VERSION_LABEL.to_string(), "20.04".to_string()),
            ]
        );

        let arm = flux_view_requests(Platform::Arm64);
        assert_eq!(arm[3].image, "ghcr.io/converged-computing/flux-view-ubuntu:arm-jammy");
    }

    #[test]
    fn test_flux_view_for_version() {
        let images = images();
        assert_eq!(flux_view_for_version(&images[0]), UBUNTU_VIEWS[0]);
        assert_eq!(flux_view_for_version(&images[1]), UBUNTU_VIEWS[1]);
        assert_eq!(flux_view_for_version(&images[2]), ROCKY_VIEWS[0]);
        assert_eq!(flux_view_for_version(&images[3]), ROCKY_VIEWS[1]);
    }

    #[test]
    fn test_render_basic_and_platform() {
        let mut rng = StdRng::seed_from_u64(7);
        let gpu_image = vec![images()[1].clone()];

        let render =
            render_from_images(SelectionMode::Basic, &gpu_image, &cfg(), "lammps-0-size-2", &mut rng)
                .unwrap();
        assert_eq!(render.flux_container, UBUNTU_VIEWS[1]);
        assert_eq!(render.executable, "lmp_gpu");
        assert_eq!(render.name, "lammps-0-size-2");

        let rocky_image = vec![images()[2].clone()];
        for _ in 0..10 {
            let render = render_from_images(
                SelectionMode::Platform,
                &rocky_image,
                &cfg(),
                "lammps-1-size-2",
                &mut rng,
            )
            .unwrap();
            assert!(ROCKY_VIEWS.contains(&render.flux_container.as_str()));
            assert_eq!(render.executable, "lmp");
        }
    }

    #[test]
    fn test_render_without_images_fails() {
        let mut rng = StdRng::seed_from_u64(7);
        assert!(render_from_images(SelectionMode::Basic, &[], &cfg(), "x", &mut rng).is_err());
    }

    #[test]
    fn test_render_descriptive() {
        let request = &flux_view_requests(Platform::Amd64)[1];
        let matches = descriptive_matches(request, Platform::Amd64, false);
        assert!(matches.contains(&(GPU_LABEL.to_string(), "no".to_string())));
        assert!(matches.contains(&(PLATFORM_LABEL.to_string(), "amd64".to_string())));

        let render = render_descriptive(&cfg(), "lammps-2-size-2", &images()[2], request, false);
        assert_eq!(render.flux_container, request.image);
        assert_eq!(render.command.as_deref(), Some(INTEL_MPI_ENV));
        assert_eq!(render.executable, "lmp");

        let vars = render.env_vars();
        assert_eq!(vars["COMMAND"], INTEL_MPI_ENV);
        assert_eq!(vars["SIZE"], "2");
        assert_eq!(vars["TASKS"], "4");
    }

    #[test]
    fn test_run_spec_serializes_flat_params() {
        let request = &flux_view_requests(Platform::Amd64)[0];
        let spec = RunSpec {
            params: render_descriptive(&cfg(), "lammps-0-size-2", &images()[0], request, true),
            iter: 0,
            total_wrapped_time: 42,
        };

        let json: serde_json::Value = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["params"]["executable"], "lmp_gpu");
        assert_eq!(json["params"]["cpu_limit"], 2);
        assert_eq!(json["total_wrapped_time"], 42);
        assert!(json["params"].get("command").is_none());
    }

    #[test]
    fn test_confirm_action() {
        assert!(confirm_action("Continue", "maybe\nYes\n".as_bytes()).unwrap());
        assert!(!confirm_action("Continue", "n\n".as_bytes()).unwrap());
        assert!(!confirm_action("Continue", "".as_bytes()).unwrap());
    }

    #[test]
    fn test_declined_run_is_an_error() {
        assert!(ensure_confirmed(false, "no\n".as_bytes()).is_err());
        assert!(ensure_confirmed(true, "no\n".as_bytes()).is_ok());
        assert!(ensure_confirmed(false, "yes\n".as_bytes()).is_ok());
    }

    const KUBECTL_STUB: &str = r#"#!/bin/sh
echo "$*" >> @DIR@/kubectl.calls
case "$*" in
  "get nodes -o json")
    echo '{"apiVersion": "v1", "items": [{"metadata": {"name": "node-0"}}], "kind": "List"}' ;;
  "apply -f -")
    cat >> @DIR@/applied.yaml
    echo "minicluster.flux-framework.org/lammps created" ;;
  *"get pods"*)
    for arg in "$@"; do
      case "$arg" in app=*) name="${arg#app=}" ;; esac
    done
    echo "{\"items\": [{\"metadata\": {\"name\": \"$name-1-bbbbb\"}, \"status\": {\"phase\": \"Running\"}}, {\"metadata\": {\"name\": \"$name-0-aaaaa\"}, \"status\": {\"phase\": \"Succeeded\"}}]}" ;;
  *"logs -f"*)
    printf 'Loop time of 10.52 on 4 procs for 100 steps with 32480 atoms\nTotal wall time: 0:00:12\n' ;;
  delete*)
    echo "minicluster.flux-framework.org deleted" ;;
  *)
    echo "unexpected command: $*" >&2
    exit 1 ;;
esac
"#;

    const COMPSPEC_STUB: &str = r#"#!/bin/sh
echo "$*" >> @DIR@/compspec.calls
echo "Found matches!"
echo "ghcr.io/rse-ops/lammps-matrix:intel-mpi-rocky-8-amd64"
"#;

    #[cfg(unix)]
    fn write_stub(dir: &Path, name: &str, script: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join(name);
        fs::write(&path, script.replace("@DIR@", &dir.display().to_string())).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[test]
    fn test_run_descriptive_writes_results() {
        let bin = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();

        let kubectl = write_stub(bin.path(), "kubectl", KUBECTL_STUB);
        let compspec = write_stub(bin.path(), "compspec", COMPSPEC_STUB);
        // Only this test points the drivers at other binaries
        unsafe {
            std::env::set_var("EXPCTL_KUBECTL", &kubectl);
            std::env::set_var("EXPCTL_COMPSPEC", &compspec);
        }

        let manifests = bin.path().join("manifests.yaml");
        let yaml = images()
            .iter()
            .fold("images:\n".to_string(), |acc, name| {
                format!("{acc}  - name: {name}\n")
            });
        fs::write(&manifests, yaml).unwrap();

        let args = LammpsRunArgs {
            config_name: LAMMPS_SIX_NAME.to_string(),
            iters: 2,
            manifests: Some(manifests),
            platform: Platform::Amd64,
            mode: SelectionMode::DescriptiveBasic,
            gpu: false,
            outdir: Some(out.path().to_path_buf()),
            seed: Some(1),
            yes: true,
        };
        run(&args).unwrap();

        let outdir = out.path().join("descriptive-basic");
        let topology: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(outdir.join("topology.json")).unwrap())
                .unwrap();
        assert_eq!(topology["items"][0]["metadata"]["name"], "node-0");

        for iter in 0..2 {
            let name = format!("lammps-{iter}-size-2");
            let log = fs::read_to_string(outdir.join("logs").join(format!("{name}.log"))).unwrap();
            assert_eq!(crate::tasks::experiments::logs::parse_wall_time(&log), Some(12.0));

            let minicluster =
                fs::read_to_string(outdir.join("logs").join(format!("minicluster-{name}.yaml")))
                    .unwrap();
            assert!(minicluster.contains(&format!("name: {name}")));
            assert!(minicluster.contains("image: ghcr.io/rse-ops/lammps-matrix:intel-mpi-rocky-8-amd64"));
            assert!(minicluster.contains(&format!("pre: {INTEL_MPI_ENV}")));
            assert!(minicluster.contains("command: lmp -v x 2 -v y 2 -v z 2"));
        }

        let specs: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(outdir.join("specs.json")).unwrap()).unwrap();
        let specs = specs.as_array().unwrap();
        assert_eq!(specs.len(), 2);
        for (iter, spec) in specs.iter().enumerate() {
            assert_eq!(spec["iter"], iter as u64);
            assert_eq!(spec["params"]["name"], format!("lammps-{iter}-size-2"));
            assert_eq!(spec["params"]["command"], INTEL_MPI_ENV);
            assert!(spec["total_wrapped_time"].as_i64().unwrap() >= 0);
        }

        // Every MiniCluster is fed through stdin, then deleted
        let applied = fs::read_to_string(bin.path().join("applied.yaml")).unwrap();
        assert_eq!(applied.matches("kind: MiniCluster").count(), 2);
        let calls = fs::read_to_string(bin.path().join("kubectl.calls")).unwrap();
        assert!(calls.contains("-n default get pods -l app=lammps-1-size-2 -o json"));
        assert!(calls.contains("-n default logs -f lammps-1-size-2-0-aaaaa"));
        assert!(calls.contains("delete miniclusters.flux-framework.org lammps-0-size-2 --wait=true"));

        let compspec_calls = fs::read_to_string(bin.path().join("compspec.calls")).unwrap();
        assert_eq!(compspec_calls.lines().count(), 2);
        assert!(compspec_calls.contains("--match io.archspec.cpu.target=amd64"));
        assert!(compspec_calls.contains("--single --randomize"));
    }
}
