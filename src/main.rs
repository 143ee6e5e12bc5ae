//! CLI entry point for the hydro discharge reporting pipeline.
//!
//! Exit codes: 0 on success (including degraded runs that produced
//! artifacts from cache), 1 when every target failed, 2 on a
//! configuration error detected before any fetch.

use clap::Parser;
use std::path::PathBuf;
use std::process;

use hydroreport_service::config::{self, FileConfig, RunConfig};
use hydroreport_service::ingest::HttpDataSource;
use hydroreport_service::logging::{self, LogLevel, LogSource};
use hydroreport_service::pipeline::Pipeline;

#[derive(Debug, Parser)]
#[clap(name = "hydroreport_service", version)]
struct Cli {
    /// Query window start (ISO-8601). Defaults to the start of yesterday, UTC.
    #[clap(long)]
    start: Option<String>,

    /// Query window end (ISO-8601). Defaults to the end of today, UTC.
    #[clap(long)]
    end: Option<String>,

    /// Comma-separated plant id list for the aggregate report
    #[clap(long)]
    plant_ids: Option<String>,

    /// Station code to chart; repeatable. Codes must be registered.
    #[clap(long = "station")]
    stations: Vec<String>,

    /// Directory chart artifacts are written into
    #[clap(long, default_value = "public")]
    output_dir: PathBuf,

    /// Artifact index path. Defaults to index.json inside the output directory.
    #[clap(long)]
    index: Option<PathBuf>,

    /// Directory for cached payloads and charts
    #[clap(long, default_value = ".cache")]
    cache_dir: PathBuf,

    /// Cache freshness window in minutes
    #[clap(long, default_value_t = config::DEFAULT_CACHE_TTL_MINUTES)]
    cache_ttl: u64,

    /// Bypass the freshness check and always call the APIs
    #[clap(long)]
    force_refresh: bool,

    /// Also produce mobile chart variants
    #[clap(long)]
    mobile: bool,

    /// Log artifact locations after the run
    #[clap(long)]
    show: bool,

    /// Optional TOML file with base_url, sheet_url, plant_ids, marked_dates
    #[clap(long)]
    config: Option<PathBuf>,

    /// Logging verbosity: 'debug', 'info', 'warn', or 'error'
    #[clap(long, default_value = "info")]
    log_level: String,

    /// Append log lines to this file in addition to the console
    #[clap(long)]
    log_file: Option<String>,
}

fn main() {
    let cli = Cli::parse();

    let Some(level) = LogLevel::parse(&cli.log_level) else {
        eprintln!("invalid --log-level '{}'", cli.log_level);
        process::exit(2);
    };
    logging::init_logger(level, cli.log_file.as_deref());

    let file_config = match &cli.config {
        Some(path) => match FileConfig::load(path) {
            Ok(loaded) => loaded,
            Err(err) => {
                logging::error(LogSource::System, None, &err.to_string());
                process::exit(2);
            }
        },
        None => FileConfig::default(),
    };

    let defaults = RunConfig::defaults();
    let index_path = cli
        .index
        .clone()
        .unwrap_or_else(|| cli.output_dir.join("index.json"));

    // Precedence: CLI flag, then config file, then built-in default.
    let run_config = RunConfig {
        start: cli.start.unwrap_or(defaults.start),
        end: cli.end.unwrap_or(defaults.end),
        plant_ids: cli
            .plant_ids
            .or(file_config.plant_ids)
            .unwrap_or(defaults.plant_ids),
        station_codes: cli.stations,
        output_dir: cli.output_dir,
        index_path,
        cache_dir: cli.cache_dir,
        cache_ttl_minutes: cli.cache_ttl,
        force_refresh: cli.force_refresh,
        mobile: cli.mobile,
        show: cli.show,
        base_url: file_config.base_url.unwrap_or(defaults.base_url),
        sheet_url: file_config.sheet_url.unwrap_or(defaults.sheet_url),
        marked_dates: file_config.marked_dates.unwrap_or_default(),
    };

    let source = match HttpDataSource::new(run_config.base_url.clone(), run_config.sheet_url.clone())
    {
        Ok(source) => source,
        Err(err) => {
            logging::error(LogSource::System, None, &err.to_string());
            process::exit(1);
        }
    };

    match Pipeline::new(&run_config, &source).run() {
        Ok(outcome) => {
            if outcome.fully_failed() {
                process::exit(1);
            }
        }
        Err(err) => {
            logging::error(LogSource::System, None, &err.to_string());
            process::exit(2);
        }
    }
}
