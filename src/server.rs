use std::{future::Future, io, net::SocketAddr};

use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::{
    AppState,
    config::{AppConfig, ConfigError},
    create_router,
    repository::{RepositoryError, RepositoryState},
};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("could not connect to the database: {0}")]
    Repository(#[from] RepositoryError),
    #[error("could not bind port {port}: {source}")]
    Bind { port: u16, source: io::Error },
    #[error("server error: {0}")]
    Serve(io::Error),
}

/// Application
///
/// The HTTP server shell. Built once by the entry point with every dependency passed
/// in, then consumed by [`Application::run`].
pub struct Application {
    listener: TcpListener,
    router: Router,
    repo: RepositoryState,
    addr: SocketAddr,
}

impl Application {
    /// build
    ///
    /// Assembles the router and binds the listener. If binding fails the repository is
    /// disconnected before the error is returned, so the caller only has to exit.
    pub async fn build(config: AppConfig, repo: RepositoryState) -> Result<Self, StartupError> {
        let port = config.port;
        let router = create_router(AppState::new(config, repo.clone()));

        let bound = TcpListener::bind(("0.0.0.0", port))
            .await
            .and_then(|listener| Ok((listener.local_addr()?, listener)));

        let (addr, listener) = match bound {
            Ok(bound) => bound,
            Err(source) => {
                shutdown(&repo).await;
                return Err(StartupError::Bind { port, source });
            }
        };

        tracing::info!("Listening on port {}", addr.port());
        Ok(Self {
            listener,
            router,
            repo,
            addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Serves until Ctrl-C or SIGTERM.
    pub async fn run(self) -> Result<(), StartupError> {
        self.run_until(shutdown_signal()).await
    }

    /// Serves until `signal` resolves, lets in-flight requests finish, then disconnects
    /// the repository.
    pub async fn run_until<F>(self, signal: F) -> Result<(), StartupError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let result = axum::serve(self.listener, self.router)
            .with_graceful_shutdown(signal)
            .await;
        shutdown(&self.repo).await;
        result.map_err(StartupError::Serve)
    }
}

async fn shutdown(repo: &RepositoryState) {
    tracing::info!("Shutting down...");
    repo.disconnect().await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
