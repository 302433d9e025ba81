use clap::{Parser, Subcommand};
use nitf_renditions::imaging::{SystemRunner, collect_statistics};
use nitf_renditions::{config, nitf, output, process};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "nitf-renditions")]
#[command(about = "Thumbnails and derived images for NITF imagery")]
#[command(long_about = "\
Thumbnails and derived images for NITF imagery

Every input gets a thumbnail plus an overview and a full-size original.
Each one is rendered with gdal_translate first; when that fails the
built-in NITF decoder takes over. A variant that neither can produce is
skipped and reported, never fatal.

Output structure:

  renditions/
  ├── manifest.json                  # Per-item results, sizes and SHA-256
  └── i_3001a/
      ├── thumbnail.jpg
      ├── overview-checksfortest.jpg
      └── original-checksfortest.jp2

Configuration is read from ./renditions.toml, or from the files given with
--config (later files override earlier ones).

Run 'nitf-renditions gen-config' to generate a documented renditions.toml.")]
#[command(version)]
struct Cli {
    /// Config file (repeatable; later files win)
    #[arg(long, global = true)]
    config: Vec<PathBuf>,

    /// Output directory
    #[arg(long, default_value = "renditions", global = true)]
    output: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render thumbnails and derived images for NITF files or directories
    Render {
        /// NITF files or directories to walk
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Skip gdal_translate and use only the built-in decoder
        #[arg(long)]
        no_external: bool,
    },
    /// Print the NITF file header and image subheaders
    Inspect {
        file: PathBuf,
    },
    /// Print gdalinfo pixel statistics and the derived scale range
    Stats {
        file: PathBuf,
    },
    /// Print a stock renditions.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Command::Render {
            inputs,
            no_external,
        } => {
            let output_dir = cli.output;
            let mut config = load_config(&cli.config)?;
            if no_external {
                config.external.enabled = false;
            }
            init_thread_pool(&config.processing);

            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    output::print_process_event(&event);
                }
            });
            let result = process::process(&inputs, &output_dir, &config, Some(tx));
            printer.join().ok();
            let manifest = result?;
            output::print_render_summary(
                &manifest,
                &output_dir.join(process::MANIFEST_FILE_NAME),
            );
        }
        Command::Inspect { file } => {
            let header = nitf::read_header(&file)?;
            output::print_inspect(&header, &file);
        }
        Command::Stats { file } => {
            let config = load_config(&cli.config)?;
            let runner = SystemRunner::new(config.external.timeout());
            let stats = collect_statistics(&runner, &config.external.info_command, &file);
            output::print_stats(&file, stats.as_ref());
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Explicit `--config` files, or `./renditions.toml` when none are given.
fn load_config(files: &[PathBuf]) -> Result<config::RenditionConfig, config::ConfigError> {
    if files.is_empty() {
        config::load_config_from_dir(std::path::Path::new("."))
    } else {
        config::load_config(files)
    }
}

/// Initialize the rayon thread pool based on processing config.
///
/// Capped at the number of available CPU cores.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
