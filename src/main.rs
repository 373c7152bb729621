use api::error_handler::AppError;
use tracing::error;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // A missing .env is fine; the process environment still applies.
    dotenvy::dotenv().ok();
    ai_llm_service::telemetry::init();

    if let Err(e) = api::start().await {
        error!(error = %e, "server failed");
        return Err(e);
    }
    Ok(())
}
