mod cli;
mod infra;
mod routes;
mod server;
mod session;

use position_desk::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
