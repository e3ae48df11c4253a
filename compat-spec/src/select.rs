//! Simulated host selection.
//!
//! Given the compatibility specification of a binary and the metadata of a
//! set of hosts, pick a host to run the binary on using more or less
//! descriptive matching strategies, and score each pick against the host the
//! binary was actually built for.

use crate::{CompatibilitySpec, host::HostMetadata};
use anyhow::Result;
use log::{debug, error};
use rand::{Rng, seq::SliceRandom};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt, fs,
    path::Path,
    str::FromStr,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SimulationMode {
    /// Select on platform only
    Basic,
    /// Select on platform and OS version
    PlatformVersion,
    /// Select on platform, OS version, and MPI variant
    DescriptiveBasic,
}

impl fmt::Display for SimulationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulationMode::Basic => write!(f, "basic"),
            SimulationMode::PlatformVersion => write!(f, "platform-version"),
            SimulationMode::DescriptiveBasic => write!(f, "descriptive-basic"),
        }
    }
}

impl FromStr for SimulationMode {
    type Err = ();

    fn from_str(input: &str) -> Result<SimulationMode, Self::Err> {
        match input {
            "basic" => Ok(SimulationMode::Basic),
            "platform-version" => Ok(SimulationMode::PlatformVersion),
            "descriptive-basic" => Ok(SimulationMode::DescriptiveBasic),
            _ => Err(()),
        }
    }
}

impl SimulationMode {
    pub fn iter_variants() -> std::slice::Iter<'static, SimulationMode> {
        static VARIANTS: [SimulationMode; 3] = [
            SimulationMode::Basic,
            SimulationMode::PlatformVersion,
            SimulationMode::DescriptiveBasic,
        ];
        VARIANTS.iter()
    }
}

/// # Description
///
/// Simulator configuration: where each binary was built (the ground truth),
/// and the host groupings that cannot be extracted from the hosts
/// themselves. GPU support is only known from how the binaries were built,
/// and some MPI variants come from a Spack environment rather than the system.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SimulationConfig {
    /// Spec file name to the host it was built on.
    pub truth: BTreeMap<String, String>,
    /// `yes`/`no` to the hosts with(out) a usable GPU.
    #[serde(default)]
    pub gpu: BTreeMap<String, Vec<String>>,
    /// MPI variant to the hosts providing it.
    #[serde(default)]
    pub mpi_variants: BTreeMap<String, Vec<String>>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        let truth = [
            ("lammps-20230802.2-l75zzkprajipt5e5daomwfyxe3meus3q.json", "corona"),
            ("lammps-20230802.2-nof5qz5k6lrafqdd6bnzpu3va5hj6qbu.json", "lassen"),
            ("lammps-20230802.2-thmw3hvmel7xuew7cipxtspzrsu7nxq3.json", "lassen"),
            ("lammps-20230802.2-fuuonv3y4cddfswssbuse5jfp2cjmn7p.json", "quartz"),
            ("lammps-20230802.2-rqspxlxcrxzhov5rlojh2rrus3x6mvbh.json", "quartz"),
        ];

        SimulationConfig {
            truth: truth
                .iter()
                .map(|(spec, host)| (spec.to_string(), host.to_string()))
                .collect(),
            gpu: BTreeMap::from([
                ("yes".to_string(), vec!["lassen".to_string()]),
                (
                    "no".to_string(),
                    vec!["corona".to_string(), "quartz".to_string()],
                ),
            ]),
            mpi_variants: BTreeMap::from([
                ("openmpi".to_string(), vec!["corona".to_string()]),
                ("mvapich2".to_string(), vec!["quartz".to_string()]),
            ]),
        }
    }
}

impl SimulationConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            let reason = format!("error reading config (path={}, error={e:?})", path.display());
            error!("{reason}");
            anyhow::anyhow!(reason)
        })?;

        Self::from_yaml(&contents).map_err(|e| {
            let reason = format!("error parsing config (path={}, error={e:?})", path.display());
            error!("{reason}");
            anyhow::anyhow!(reason)
        })
    }
}

/// # Description
///
/// Hosts grouped by each attribute we can select on.
#[derive(Clone, Debug, Default)]
pub struct HostIndex {
    pub platform: BTreeMap<String, Vec<String>>,
    pub gpu: BTreeMap<String, Vec<String>>,
    pub os_name: BTreeMap<String, Vec<String>>,
    pub os_version: BTreeMap<String, Vec<String>>,
    pub mpi_variant: BTreeMap<String, Vec<String>>,
    pub mpi_version: BTreeMap<String, Vec<String>>,
}

fn push(group: &mut BTreeMap<String, Vec<String>>, key: &str, hostname: &str) {
    group
        .entry(key.to_string())
        .or_default()
        .push(hostname.to_string());
}

impl HostIndex {
    pub fn new(config: &SimulationConfig) -> Self {
        HostIndex {
            gpu: config.gpu.clone(),
            mpi_variant: config.mpi_variants.clone(),
            ..Default::default()
        }
    }

    pub fn add_host(&mut self, hostname: &str, host: &HostMetadata) -> Result<()> {
        push(&mut self.platform, host.platform()?, hostname);
        push(&mut self.os_name, host.os_name()?, hostname);
        push(&mut self.os_version, host.os_version()?, hostname);
        push(&mut self.mpi_variant, host.mpi_variant()?, hostname);
        push(&mut self.mpi_version, host.mpi_version()?, hostname);

        Ok(())
    }

    /// # Description
    ///
    /// The hosts a binary may be placed on under a given mode. For the basic
    /// mode this is the platform group as-is, for the others the intersection
    /// of the matching groups. Groups the index has never seen are empty.
    pub fn candidates(&self, mode: SimulationMode, req: &Requirements) -> Vec<String> {
        fn group<'a>(map: &'a BTreeMap<String, Vec<String>>, key: &str) -> BTreeSet<&'a String> {
            map.get(key).map(|hosts| hosts.iter().collect()).unwrap_or_default()
        }

        match mode {
            SimulationMode::Basic => self.platform.get(&req.platform).cloned().unwrap_or_default(),
            SimulationMode::PlatformVersion => group(&self.platform, &req.platform)
                .intersection(&group(&self.os_version, &req.os_version))
                .map(|host| host.to_string())
                .collect(),
            SimulationMode::DescriptiveBasic => {
                let platform_version: BTreeSet<&String> = group(&self.platform, &req.platform)
                    .intersection(&group(&self.os_version, &req.os_version))
                    .copied()
                    .collect();
                platform_version
                    .intersection(&group(&self.mpi_variant, &req.mpi_variant))
                    .map(|host| host.to_string())
                    .collect()
            }
        }
    }

    /// Pick uniformly at random among the candidates, if any.
    pub fn select<R: Rng + ?Sized>(
        &self,
        mode: SimulationMode,
        req: &Requirements,
        rng: &mut R,
    ) -> Option<String> {
        self.candidates(mode, req).choose(rng).cloned()
    }
}

/// The attributes of a binary we select hosts on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Requirements {
    pub platform: String,
    pub os_version: String,
    pub mpi_variant: String,
}

impl Requirements {
    pub fn from_spec(spec: &CompatibilitySpec) -> Result<Self> {
        let get = |key: &str| -> Result<String> {
            spec.find_attribute(key).map(str::to_string).ok_or_else(|| {
                let reason = format!(
                    "spec is missing required attribute (spec={}, attribute={key})",
                    spec.metadata.name
                );
                error!("{reason}");
                anyhow::anyhow!(reason)
            })
        };

        Ok(Requirements {
            platform: get("cpu.target")?,
            os_version: get("os.release")?,
            mpi_variant: get("mpi.implementation")?,
        })
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct SelectionOutcome {
    pub selected: Option<String>,
    pub needed: String,
    pub correct: bool,
}

/// Mode name to binary name to one outcome per iteration.
pub type SimulationResults = BTreeMap<String, BTreeMap<String, Vec<SelectionOutcome>>>;

/// # Description
///
/// Run `iters` selections per mode and per spec.
///
/// # Arguments
///
/// * `specs`: compatibility specs keyed by their file name.
/// * `index`: the hosts to select from.
/// * `truth`: spec file name to the host it must run on.
/// * `iters`: number of selections per spec and mode.
/// * `rng`: source of randomness for the uniform picks.
pub fn simulate<R: Rng + ?Sized>(
    specs: &BTreeMap<String, CompatibilitySpec>,
    index: &HostIndex,
    truth: &BTreeMap<String, String>,
    iters: u32,
    rng: &mut R,
) -> Result<SimulationResults> {
    let mut results = SimulationResults::new();

    for mode in SimulationMode::iter_variants() {
        let mode_results = results.entry(mode.to_string()).or_default();

        for (spec_name, spec) in specs {
            let binary = spec_name.replace(".json", "");
            let needed = truth.get(spec_name).ok_or_else(|| {
                let reason = format!("no ground truth host for spec (spec={spec_name})");
                error!("{reason}");
                anyhow::anyhow!(reason)
            })?;
            let req = Requirements::from_spec(spec)?;
            debug!("{mode}: {binary} requires {req:?}");

            let outcomes = mode_results.entry(binary).or_default();
            for _ in 0..iters {
                let selected = index.select(*mode, &req, rng);
                let correct = selected.as_deref() == Some(needed.as_str());
                outcomes.push(SelectionOutcome {
                    selected,
                    needed: needed.clone(),
                    correct,
                });
            }
        }
    }

    Ok(results)
}

/// Fraction of correct selections per mode.
pub fn accuracy(results: &SimulationResults) -> BTreeMap<String, f64> {
    results
        .iter()
        .map(|(mode, binaries)| {
            let (total, correct) = binaries
                .values()
                .flatten()
                .fold((0usize, 0usize), |(total, correct), outcome| {
                    (total + 1, correct + usize::from(outcome.correct))
                });
            let level = if total == 0 {
                0.0
            } else {
                correct as f64 / total as f64
            };
            (mode.clone(), level)
        })
        .collect()
}
