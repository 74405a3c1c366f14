use crate::infra::build_services;
use clap::Args;
use premise_intake::config::AppConfig;
use premise_intake::error::AppError;
use premise_intake::telemetry;
use premise_intake::workflows::premises::{
    BatchRunner, DrainHandle, OutcomeWriter, PremiseCsvReader, RowPipeline,
};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Args, Debug)]
pub(crate) struct ProcessArgs {
    /// Premises CSV to process
    #[arg(long)]
    pub(crate) input: PathBuf,
    /// Directory receiving processed_premises.csv, errors.csv, and duplicates.csv
    #[arg(long, default_value = "output")]
    pub(crate) output_dir: PathBuf,
    /// Override the number of rows processed concurrently
    #[arg(long, value_parser = parse_workers)]
    pub(crate) workers: Option<usize>,
    /// Override the similarity at which a record counts as a duplicate (0.0-1.0)
    #[arg(long, value_parser = parse_unit_interval)]
    pub(crate) duplicate_threshold: Option<f64>,
}

fn parse_workers(raw: &str) -> Result<usize, String> {
    match raw.trim().parse::<usize>() {
        Ok(0) => Err("at least one worker is required".to_string()),
        Ok(workers) => Ok(workers),
        Err(err) => Err(format!("'{raw}' is not a worker count ({err})")),
    }
}

fn parse_unit_interval(raw: &str) -> Result<f64, String> {
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|err| format!("'{raw}' is not a number ({err})"))?;
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("{value} is outside 0.0-1.0"))
    }
}

pub(crate) async fn run_process(args: ProcessArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;
    if let Some(workers) = args.workers {
        config.pipeline.workers = workers;
    }
    if let Some(threshold) = args.duplicate_threshold {
        config.pipeline.duplicate_threshold = threshold;
    }

    telemetry::init(&config.telemetry)?;

    let records = PremiseCsvReader::from_path(&args.input)?;
    let services = build_services(&config)?;
    let runner = BatchRunner::new(RowPipeline::new(services, config.pipeline.clone()));

    let drain = DrainHandle::new();
    let signal_drain = drain.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; finishing in-flight rows");
            signal_drain.request();
        }
    });

    info!(input = %args.input.display(), records = records.len(), "processing premises");
    let result = runner.execute(records, &drain).await?;
    let paths = OutcomeWriter::write_to_dir(&args.output_dir, &result)?;

    println!("{}", result.summary());
    println!("accepted:   {}", paths.accepted.display());
    println!("errors:     {}", paths.errors.display());
    println!("duplicates: {}", paths.duplicates.display());
    Ok(())
}
