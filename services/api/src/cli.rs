use crate::process::{run_process, ProcessArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use premise_intake::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Premise Intake",
    about = "Validate, de-duplicate, and classify premises records from CSV",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Process a premises CSV and write accepted, error, and duplicate files
    Process(ProcessArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Process(args) => run_process(args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn process_accepts_overrides() {
        let cli = Cli::try_parse_from([
            "premise-intake",
            "process",
            "--input",
            "premises.csv",
            "--workers",
            "8",
            "--duplicate-threshold",
            "0.9",
        ])
        .expect("arguments parse");

        match cli.command {
            Some(Command::Process(args)) => {
                assert_eq!(args.workers, Some(8));
                assert_eq!(args.duplicate_threshold, Some(0.9));
                assert_eq!(args.output_dir.to_str(), Some("output"));
            }
            other => panic!("expected process command, got {other:?}"),
        }
    }

    #[test]
    fn threshold_outside_unit_interval_is_rejected() {
        let result = Cli::try_parse_from([
            "premise-intake",
            "process",
            "--input",
            "premises.csv",
            "--duplicate-threshold",
            "1.5",
        ]);
        assert!(result.is_err());
    }
}
