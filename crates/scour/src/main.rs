use anyhow::Result;
use log::LevelFilter;
use scour::runner::{format_report, format_violation};
use scour::{Args, Config, Outcome};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr; stdout carries only sanitized output
    let mut logger = env_logger::Builder::from_default_env();
    if std::env::var_os("RUST_LOG").is_none() {
        logger.filter_level(LevelFilter::Warn);
        logger.filter_module("scour", LevelFilter::Info);
    }
    logger.init();

    match run().await {
        Ok(code) => code,
        Err(e) => {
            log::error!("Run failed: {:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

async fn run() -> Result<ExitCode> {
    let args = Args::parse(std::env::args().skip(1))?;
    if args.help {
        print!("{}", scour::cli::USAGE);
        return Ok(ExitCode::SUCCESS);
    }

    let config = Config::load().await?;
    let report = args.report || config.output.report;

    match scour::run(&args, &config).await? {
        Outcome::Sanitized(summary) => {
            if report {
                eprintln!("{}", format_report(&summary));
            }
            Ok(ExitCode::SUCCESS)
        }
        Outcome::Rejected(violation) => {
            eprintln!("{}", format_violation(&violation));
            Ok(ExitCode::from(1))
        }
    }
}
