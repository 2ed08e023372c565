use anyhow::Result;

#[cfg(feature = "cli")]
mod main {
    use super::*;
    use clap::{Parser, Subcommand};
    use isolevel::{config::SimulationConfig, run};
    use std::path::PathBuf;

    #[derive(Debug, Parser)]
    #[command(about = "Level-set simulation with chunked isosurface extraction", long_about = None)]
    struct Cli {
        #[command(subcommand)]
        command: Command,
    }

    #[derive(Debug, Subcommand)]
    enum Command {
        /// Run the simulation described by a configuration file
        Run {
            /// Path to the RON configuration file
            #[arg(short, long)]
            config: PathBuf,

            /// Number of frames to advance, overriding the configuration
            #[arg(short, long)]
            n_frames: Option<usize>,
        },
        /// Write the default configuration to a file
        GenerateConfig {
            /// Path to write the RON configuration file to
            #[arg(short, long)]
            output_path: PathBuf,
        },
    }

    pub fn main() -> Result<()> {
        env_logger::init();

        let cli = Cli::parse();

        match cli.command {
            Command::Run { config, n_frames } => {
                let mut config = SimulationConfig::from_ron_file(config)?;
                if let Some(n_frames) = n_frames {
                    config.n_frames = n_frames;
                }
                let summary = run::run(&config)?;
                println!(
                    "Advanced {} frames: {} of {} chunks have a surface, with {} vertices and {} triangles in total",
                    summary.n_frames,
                    summary.n_chunk_visuals,
                    summary.n_chunks,
                    summary.n_vertices,
                    summary.n_triangles
                );
                Ok(())
            }
            Command::GenerateConfig { output_path } => {
                SimulationConfig::default().write_ron_file(output_path)
            }
        }
    }
}

#[cfg(not(feature = "cli"))]
mod main {
    use super::*;

    pub fn main() -> Result<()> {
        anyhow::bail!("This binary requires the `cli` feature to be enabled.")
    }
}

fn main() -> Result<()> {
    main::main()
}
