use std::{process::ExitCode, sync::Arc};

use person_api::{
    Application,
    config::{AppConfig, Env},
    logging,
    repository::{PostgresRepository, RepositoryState},
    server::StartupError,
};

/// main
///
/// Entry point: configuration, logging, database, then the HTTP server. Any startup
/// failure is logged and turns into a non-zero exit code.
#[tokio::main]
async fn main() -> ExitCode {
    // Loads .env settings before configuration is read.
    dotenv::dotenv().ok();

    logging::init_tracing(Env::from_env());

    match start().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "server stopped");
            ExitCode::FAILURE
        }
    }
}

async fn start() -> Result<(), StartupError> {
    let config = AppConfig::load()?;

    if config.jwt_secret.is_empty() {
        tracing::warn!("JWT_SECRET is not set; tokens are signed and verified with an empty secret");
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    let repo = PostgresRepository::connect(&config.db_url, config.db_max_connections).await?;
    let repo = Arc::new(repo) as RepositoryState;

    // build() disconnects the repository itself if it fails.
    let app = Application::build(config, repo).await?;

    tracing::info!(
        "API Documentation (Swagger UI) available at: http://localhost:{}/swagger-ui",
        app.local_addr().port()
    );

    app.run().await
}
