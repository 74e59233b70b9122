//! cran-recipe CLI
//!
//! Looks a package up in the CRAN database and prints a Spack recipe stub.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::Parser;
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

use cran_db::fetch::{DEFAULT_DATABASE_URL, DEFAULT_MIRROR};
use cran_db::{download_to_tempfile, DatabaseFormat, HttpFetcher, Table};
use cran_recipe::{existing, generate, package_name, Options, Result};

#[derive(Parser)]
#[command(name = "cran-recipe")]
#[command(about = "Generate Spack recipe stubs for CRAN packages", long_about = None)]
#[command(version)]
struct Cli {
    /// CRAN package name (prompted for when omitted)
    package: Option<String>,

    /// URL of the package database
    #[arg(long, env = "CRAN_DATABASE_URL", default_value = DEFAULT_DATABASE_URL)]
    database_url: String,

    /// Read the package database from a local file instead of downloading it
    #[arg(long)]
    database_file: Option<PathBuf>,

    /// Database format (auto, rds, dcf)
    #[arg(long, default_value = "auto")]
    database_format: DatabaseFormat,

    /// Base URL of the source tarballs
    #[arg(long, env = "CRAN_MIRROR", default_value = DEFAULT_MIRROR)]
    mirror: String,

    /// Also emit the entries of the Depends field
    #[arg(long)]
    include_depends: bool,

    /// Carry the version() lines of an existing package.py into the output
    #[arg(long, value_name = "PACKAGE_PY")]
    existing: Option<PathBuf>,

    /// Print a complete package.py with import and class statement
    #[arg(long)]
    header: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn setup_logging(level: &str) {
    let level = match level.to_lowercase().as_str() {
        "error" => Level::ERROR,
        "warn" => Level::WARN,
        "info" => Level::INFO,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::WARN,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(io::stderr)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

fn run(cli: Cli) -> Result<()> {
    let previous_versions = match &cli.existing {
        Some(path) => existing::read(path)?,
        None => Vec::new(),
    };
    let fetcher = HttpFetcher::new()?;

    // The temporary copy lives until the recipe has been printed.
    let downloaded;
    let database: &Path = match &cli.database_file {
        Some(path) => path,
        None => {
            downloaded = download_to_tempfile(&fetcher, &cli.database_url)?;
            downloaded.path()
        }
    };
    let table = Table::load(database, cli.database_format)?;

    // The prompt goes to stderr so stdout only carries the recipe.
    let package = package_name(cli.package, io::stdin().lock(), io::stderr())?;
    debug!("Looking up {:?}", package);

    let options = Options {
        mirror: cli.mirror,
        include_depends: cli.include_depends,
        previous_versions,
    };
    let recipe = generate(&fetcher, &table, &package, &options)?;

    let output = if cli.header {
        recipe.render_package()
    } else {
        recipe.render_body()
    };
    io::stdout().lock().write_all(output.as_bytes())?;
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    setup_logging(&cli.log_level);

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
