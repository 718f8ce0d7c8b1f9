//! Sentinel Score - batch entry point
//!
//! Reads LogRecords as JSON lines on stdin, writes AnomalyResults as JSON lines
//! on stdout. Logs go to stderr via env_logger.
//!
//! Usage: sentinel-score [--config FILE] [--force-retrain] < records.jsonl

use std::io::{self, BufRead, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use sentinel_core::constants::{APP_NAME, APP_VERSION};
use sentinel_core::{Engine, EngineConfig, EngineError, LogRecord};

struct Args {
    config: Option<PathBuf>,
    force_retrain: bool,
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args {
        config: None,
        force_retrain: false,
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let path = iter.next().ok_or("--config needs a file path")?;
                args.config = Some(PathBuf::from(path));
            }
            "--force-retrain" => args.force_retrain = true,
            other => return Err(format!("unknown argument '{}'", other)),
        }
    }
    Ok(args)
}

fn read_records() -> io::Result<Vec<LogRecord>> {
    let stdin = io::stdin();
    let mut records = Vec::new();
    for (n, line) in stdin.lock().lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<LogRecord>(&line) {
            Ok(record) => records.push(record),
            Err(e) => log::warn!("Line {}: not a log record ({}), skipped", n + 1, e),
        }
    }
    Ok(records)
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("Starting {} v{}", APP_NAME, APP_VERSION);

    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!("Usage: sentinel-score [--config FILE] [--force-retrain] < records.jsonl");
            return ExitCode::from(2);
        }
    };

    let config = match &args.config {
        Some(path) => match EngineConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                log::error!("{}", e);
                return ExitCode::from(2);
            }
        },
        None => EngineConfig::default(),
    };
    let mut config = config.with_env_overrides();
    if args.force_retrain {
        config.force_retrain = true;
    }

    let records = match read_records() {
        Ok(records) => records,
        Err(e) => {
            log::error!("Failed to read stdin: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut engine = match Engine::new(config) {
        Ok(engine) => engine,
        Err(e) => {
            log::error!("{}", e);
            return ExitCode::from(2);
        }
    };

    let outcome = engine.analyze(&records);
    engine.shutdown();

    let (results, code) = match outcome {
        Ok(report) => {
            log::info!(
                "{} records scored, {} flagged",
                report.results.len(),
                report.flagged().count()
            );
            (report.results, ExitCode::SUCCESS)
        }
        Err(EngineError::EmptyBatch) => {
            log::warn!("No records on stdin");
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            log::error!("{}", e);
            let partial = e.partial_results().to_vec();
            (partial, ExitCode::FAILURE)
        }
    };

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for result in &results {
        let written = serde_json::to_string(result)
            .map_err(io::Error::from)
            .and_then(|line| writeln!(out, "{}", line));
        if let Err(e) = written {
            log::error!("Failed to write results: {}", e);
            return ExitCode::FAILURE;
        }
    }
    if let Err(e) = out.flush() {
        log::error!("Failed to write results: {}", e);
        return ExitCode::FAILURE;
    }

    code
}
