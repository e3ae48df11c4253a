use crate::{
    env::Env,
    tasks::{
        experiments::{self, FluxOperatorSubCommand, SpackSubCommand},
        jobspecs::{self, JobspecsGenerateArgs},
    },
};
use clap::{Parser, Subcommand};
use env_logger::Builder;

pub mod env;
pub mod tasks;

#[derive(Parser)]
struct Cli {
    // The name of the task to execute
    #[clap(subcommand)]
    task: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run LAMMPS on Kubernetes with different image selection modes
    FluxOperator {
        #[command(subcommand)]
        flux_operator_command: FluxOperatorSubCommand,
    },
    /// Extract compatibility specs from Spack and simulate host selection
    Spack {
        #[command(subcommand)]
        spack_command: SpackSubCommand,
    },
    /// Generate Flux jobspecs from compatibility specs
    Jobspecs {
        #[command(subcommand)]
        jobspecs_command: JobspecsCommand,
    },
}

#[derive(Debug, Subcommand)]
enum JobspecsCommand {
    /// Write one jobspec per compatibility level for each spec
    Generate(JobspecsGenerateArgs),
}

fn main() -> anyhow::Result<()> {
    // Initialize the logger.
    let env = env_logger::Env::default().filter_or("RUST_LOG", "info");
    let mut builder = Builder::from_env(env);
    builder.init();

    let cli = Cli::parse();
    match &cli.task {
        Command::FluxOperator {
            flux_operator_command,
        } => match flux_operator_command {
            FluxOperatorSubCommand::Run(run_args) => {
                experiments::lammps::run(run_args)?;
            }
            FluxOperatorSubCommand::Plot { results, out } => {
                let results = results
                    .as_deref()
                    .map(Env::expand_path)
                    .unwrap_or_else(|| Env::flux_operator_root().join("results").join("amd64"));
                let out = out
                    .as_deref()
                    .map(Env::expand_path)
                    .unwrap_or_else(|| Env::flux_operator_root().join("img"));
                experiments::plot::plot(&results, &out)?;
            }
            FluxOperatorSubCommand::Gradient { out } => {
                let out = out
                    .as_deref()
                    .map(Env::expand_path)
                    .unwrap_or_else(|| Env::flux_operator_root().join("img"));
                experiments::gradient::run(&out)?;
            }
        },
        Command::Spack { spack_command } => match spack_command {
            SpackSubCommand::Extract(extract_args) => {
                experiments::spack::extract(extract_args)?;
            }
            SpackSubCommand::Simulate(simulate_args) => {
                experiments::spack::simulate(simulate_args)?;
            }
            SpackSubCommand::Plot { results, out } => {
                let root = Env::spack_bare_metal_root();
                let results = results.as_deref().map(Env::expand_path).unwrap_or_else(|| {
                    root.join("results").join("simulation-results.json")
                });
                let out = out
                    .as_deref()
                    .map(Env::expand_path)
                    .unwrap_or_else(|| root.join("img"));
                experiments::spack::plot(&results, &out)?;
            }
        },
        Command::Jobspecs { jobspecs_command } => match jobspecs_command {
            JobspecsCommand::Generate(generate_args) => {
                jobspecs::generate(generate_args)?;
            }
        },
    }

    Ok(())
}
