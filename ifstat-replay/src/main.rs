#![warn(clippy::all)]

#[macro_use]
extern crate log;

use clap::{crate_version, Parser};
use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

use std::fs::File;
use std::io;
use std::path::Path;

use flate2::read::GzDecoder;
use xz2::read::XzDecoder;

use libifstat::{Config, Dispatcher, FilterSet, ThreadedDispatcher};

mod engine;
mod error;
mod output;

use engine::ReplayEngine;
use error::Error;
use output::{Format, Report};

/// Replay a capture through the per-filter size classifier
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<String>,

    /// Number of execution contexts (default: from config, or 1; 0 means one per CPU)
    #[arg(short, long)]
    jobs: Option<u8>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = Format::Table)]
    format: Format,

    /// Also print the counters of each execution context
    #[arg(long)]
    per_context: bool,

    /// Be verbose
    #[arg(short, long)]
    verbose: bool,

    /// Input file (`-` for stdin)
    input: Option<String>,
}

fn load_config(config: &mut Config, filename: &str) -> Result<(), Error> {
    debug!("Loading configuration {filename}");
    let path = Path::new(&filename);
    let file = File::open(path)?;
    config.load_config(file)?;
    Ok(())
}

fn open_input(input_filename: &str) -> Result<Box<dyn io::Read + Send>, Error> {
    if input_filename == "-" {
        return Ok(Box::new(io::stdin()));
    }
    let path = Path::new(input_filename);
    let file = File::open(path)?;
    let reader: Box<dyn io::Read + Send> = if input_filename.ends_with(".gz") {
        Box::new(GzDecoder::new(file))
    } else if input_filename.ends_with(".xz") {
        Box::new(XzDecoder::new(file))
    } else if input_filename.ends_with(".lz4") {
        Box::new(lz4::Decoder::new(file)?)
    } else {
        Box::new(file)
    };
    Ok(reader)
}

fn main() -> Result<(), Error> {
    let args = Args::parse();

    // load config
    let mut config = Config::default();
    if let Some(filename) = args.config.as_ref() {
        load_config(&mut config, filename)?;
    }
    // override config options from command-line arguments
    if let Some(jobs) = args.jobs {
        config.set("num_threads", jobs);
    }

    let default_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let env_filter = EnvFilter::try_from_env("IFSTAT_LOG")
        .unwrap_or_else(|_| EnvFilter::default().add_directive(default_level.into()));
    let writer = match config.get("log_file") {
        Some(log_file) => {
            let output_dir = config.get("output_dir").unwrap_or(".");
            BoxMakeWriter::new(RollingFileAppender::new(Rotation::NEVER, output_dir, log_file))
        }
        None => BoxMakeWriter::new(io::stderr),
    };
    tracing_subscriber::fmt()
        .with_writer(writer)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .compact()
        .init();

    info!("ifstat-replay {}", crate_version!());

    let filters = FilterSet::from_config(&config)?;
    if filters.num_enabled() == 0 {
        warn!("No filters enabled");
    }

    let input_filename = args
        .input
        .as_deref()
        .ok_or(Error::Generic("Input file name cannot be empty"))?;
    let mut input_reader = open_input(input_filename)?;

    let num_threads = config.get_usize("num_threads").unwrap_or(1);
    let stdout = io::stdout();
    let mut out = stdout.lock();
    if num_threads == 1 {
        let dispatcher = Dispatcher::new(filters, 1);
        let mut engine = ReplayEngine::new(dispatcher, &config);
        let replay = engine.run(&mut input_reader)?;
        let report = Report {
            stats: engine.sink().stats(),
            replay,
            per_context: args.per_context,
        };
        report.write(args.format, &mut out)?;
    } else {
        let dispatcher = ThreadedDispatcher::new(filters, &config);
        debug!("{} workers", dispatcher.num_workers());
        let mut engine = ReplayEngine::new(dispatcher, &config);
        let replay = engine.run(&mut input_reader)?;
        let report = Report {
            stats: engine.sink().stats(),
            replay,
            per_context: args.per_context,
        };
        report.write(args.format, &mut out)?;
    }

    info!("ifstat-replay: done, exiting");
    Ok(())
}
