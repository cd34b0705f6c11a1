use clap::{Parser, Subcommand};
use lookbook::config::{self, Config};
use lookbook::display::{self, DisplayProps, LoadState};
use lookbook::naming;
use lookbook::optimize::{self, OptimizeConfig};
use lookbook::output;
use lookbook::resolver::{self, Resolver};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lookbook")]
#[command(about = "Responsive image pipeline for the storefront catalog")]
#[command(long_about = "\
Responsive image pipeline for the storefront catalog

Originals go in, a width ladder of WebP derivatives, blur-up placeholders and
a manifest come out. The storefront resolves identifiers against the manifest
at runtime.

Project layout (all paths configurable in lookbook.toml):

  .
  ├── lookbook.toml                       # Optional, sparse
  ├── assets/images/original/             # Originals, scanned recursively
  │   ├── Evening Gown.jpg                # → identifier Evening-Gown
  │   └── minis/navy-midi.png             # → identifier navy-midi
  └── public/images/
      ├── manifest.json                   # Written once per run
      └── optimized/
          └── Evening-Gown/
              ├── Evening-Gown-320.webp
              └── ...

A missing or empty originals directory is not an error.

Run 'lookbook gen-config' to generate a documented lookbook.toml.")]
#[command(version)]
struct Cli {
    /// Project root that config paths are relative to
    #[arg(long, default_value = ".", global = true)]
    project_root: PathBuf,

    /// Only log warnings and errors
    #[arg(long, short, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

/// Where to read the manifest from when resolving.
#[derive(clap::Args, Clone)]
struct ManifestArgs {
    /// Manifest file path or http(s) URL (default: the project's manifest_path)
    #[arg(long, conflicts_with = "base_url")]
    manifest: Option<String>,

    /// Storefront origin; the manifest is fetched from its resolver.manifest_url
    #[arg(long)]
    base_url: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Generate derivatives, placeholders and the manifest
    Optimize,
    /// Resolve identifiers against the manifest
    Resolve {
        #[command(flatten)]
        manifest: ManifestArgs,
        /// Image identifiers
        #[arg(required = true)]
        identifiers: Vec<String>,
    },
    /// Print the display HTML for an identifier
    Render {
        #[command(flatten)]
        manifest: ManifestArgs,
        /// Render as an above-the-fold image (no deferral)
        #[arg(long)]
        priority: bool,
        /// Alt text
        #[arg(long, default_value = "")]
        alt: String,
        /// Image identifier
        identifier: String,
    },
    /// Print a stock lookbook.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.quiet);

    match cli.command {
        Command::Optimize => {
            let config = config::load_config(&cli.project_root)?;
            init_thread_pool(&config.processing);
            let optimize_config = OptimizeConfig::from_config(&config, &cli.project_root);
            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    output::print_optimize_event(&event);
                }
            });
            let result = optimize::optimize(&optimize_config, Some(tx));
            printer
                .join()
                .map_err(|_| "progress printer thread panicked")?;
            output::print_optimize_outcome(&result?);
        }
        Command::Resolve {
            manifest,
            identifiers,
        } => {
            let config = config::load_config(&cli.project_root)?;
            let resolver = build_resolver(&config, &cli.project_root, &manifest);
            let resolved = runtime()?.block_on(futures::future::join_all(
                identifiers.iter().map(|id| resolver.resolve(id)),
            ));
            output::print_resolved(&resolved, resolver.sizes());
        }
        Command::Render {
            manifest,
            priority,
            alt,
            identifier,
        } => {
            let config = config::load_config(&cli.project_root)?;
            let resolver = build_resolver(&config, &cli.project_root, &manifest);
            let image = runtime()?.block_on(resolver.resolve(&identifier));
            let props = DisplayProps {
                alt,
                sizes: resolver.sizes().to_string(),
                priority,
                root_margin: config.display.root_margin,
            };
            if !priority {
                println!("<!-- idle -->");
                println!(
                    "{}",
                    display::render_state(&props, &image, LoadState::Idle).into_string()
                );
            }
            println!("<!-- loading -->");
            println!(
                "{}",
                display::render_state(&props, &image, LoadState::Loading).into_string()
            );
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Install the log subscriber. `RUST_LOG` wins over `--quiet`.
fn init_tracing(quiet: bool) {
    let default_level = if quiet { "warn" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores: the user can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

fn runtime() -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
}

/// Resolver reading `--manifest`, the published manifest under `--base-url`,
/// or the manifest this project writes.
fn build_resolver(config: &Config, root: &Path, args: &ManifestArgs) -> Resolver {
    let location = match (&args.manifest, &args.base_url) {
        (Some(location), _) => location.clone(),
        (None, Some(base)) => naming::join_url(base, &[&config.resolver.manifest_url]),
        (None, None) => config
            .paths
            .resolve(root)
            .manifest_path
            .to_string_lossy()
            .into_owned(),
    };
    Resolver::from_config(config, resolver::source_for(&location))
}
