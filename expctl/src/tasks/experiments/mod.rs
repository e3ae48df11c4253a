use crate::tasks::experiments::{
    lammps::LammpsRunArgs,
    spack::{SpackExtractArgs, SpackSimulateArgs},
};
use clap::Subcommand;
use std::path::PathBuf;

pub mod color;
pub mod gradient;
pub mod lammps;
pub mod logs;
pub mod modes;
pub mod plot;
pub mod spack;

/// LAMMPS experiments on a Kubernetes cluster with the Flux Operator.
#[derive(Debug, Subcommand)]
pub enum FluxOperatorSubCommand {
    /// Run
    Run(LammpsRunArgs),
    /// Parse logs and plot
    Plot {
        /// Directory with the raw results, one sub-directory per mode
        #[arg(long)]
        results: Option<PathBuf>,
        /// Directory to save parsed results and plots to
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Plot the cosine distance between compatibility levels
    Gradient {
        /// Directory to save the matrix and its heatmap to
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

/// Compatibility specs of Spack installs on bare-metal hosts.
#[derive(Debug, Subcommand)]
pub enum SpackSubCommand {
    /// Extract compatibility specs from a Spack installation
    Extract(SpackExtractArgs),
    /// Simulate host selection for the extracted specs
    Simulate(SpackSimulateArgs),
    /// Plot
    Plot {
        /// simulation-results.json written by `simulate`
        #[arg(long)]
        results: Option<PathBuf>,
        /// Directory to save parsed results and plots to
        #[arg(long)]
        out: Option<PathBuf>,
    },
}
