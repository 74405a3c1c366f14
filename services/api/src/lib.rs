mod cli;
mod infra;
mod process;
mod routes;
mod server;

use premise_intake::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
