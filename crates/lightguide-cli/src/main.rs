//! Lightguide command-line interface.
//!
//! Run combiner jobs from TOML configuration files:
//! ```sh
//! lightguide run job.toml
//! lightguide validate job.toml
//! lightguide materials
//! ```

mod config;
mod runner;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use lightguide_materials::catalogue::{self, CATALOGUE};

#[derive(Parser)]
#[command(name = "lightguide")]
#[command(about = "Lightguide: k-space and ray-tracing design of waveguide combiners")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a job from a TOML configuration file.
    Run {
        /// Path to the job configuration file.
        config: PathBuf,
        /// Output directory (overrides config file setting).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Build every object of a job without running the 3-D trace.
    Validate {
        /// Path to the job configuration file.
        config: PathBuf,
    },
    /// List the built-in Sellmeier catalogue.
    Materials,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, output } => {
            println!("Lightguide");
            println!("==========");
            let job = config::load_config(&config)?;
            println!("Configuration: {}", config.display());

            let result = runner::run_job(&job, true)?;

            let out_dir = output.unwrap_or_else(|| PathBuf::from(&job.output.directory));

            if let (Some(domain), Some(solution)) = (&result.kspace, &result.solution) {
                if job.output.save_csv {
                    runner::write_kspace_csv(solution, domain, &out_dir.join("kspace.csv"))?;
                }
                if let (Some(layout), Some(coverage)) = (&result.layout, &result.coverage) {
                    if job.output.save_csv {
                        runner::write_coverage_csv(coverage, solution, &out_dir.join("coverage.csv"))?;
                    }
                    if job.output.save_json {
                        runner::write_footprints_json(layout, domain, &out_dir.join("footprints.json"))?;
                    }
                }
            }

            if let (Some(scene), Some(graphs)) = (&result.scene, &result.graphs) {
                if job.output.save_csv {
                    runner::write_rays_csv(scene.trace_result()?, scene, &out_dir.join("rays.csv"))?;
                    runner::write_interactions_csv(
                        &result.orders,
                        scene,
                        &out_dir.join("interactions.csv"),
                    )?;
                }
                if job.output.save_json {
                    runner::write_graph_json(graphs, &out_dir.join("graph.json"))?;
                }
            }

            println!("Job complete.");
            Ok(())
        }
        Commands::Validate { config } => {
            let job = config::load_config(&config)?;
            runner::run_job(&job, false)?;
            println!("Configuration is valid: {}", config.display());
            Ok(())
        }
        Commands::Materials => {
            println!("Available materials (Sellmeier, λ in µm):");
            println!();
            for name in CATALOGUE {
                let m = catalogue::lookup(name)?;
                println!(
                    "  {:<12} n(0.46) = {:.4}  n(0.525) = {:.4}  n(0.62) = {:.4}",
                    name,
                    m.index(0.46),
                    m.index(0.525),
                    m.index(0.62)
                );
            }
            println!();
            println!("Further media can be declared in a job's [materials] table.");
            Ok(())
        }
    }
}
