//! `Gateway`: loads a catalog, initializes the resource graph, and serves
//! the HTTP/MCP surface until shutdown (spec §6.4, §9, §10).

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use super::router::{create_router, AppState};
use crate::catalog::{self, Registries};
use crate::cli::Cli;
use crate::instrumentation::{Instrumentation, Tracer};
use crate::manager::ResourceManager;
use crate::{auth, source, tool, Error, Result};

/// A fully initialized gateway, bound to its resource graph and ready to
/// serve once [`Gateway::run`] is called.
pub struct Gateway {
    manager: Arc<ResourceManager>,
    instrumentation: Instrumentation,
    address: SocketAddr,
    shutdown_timeout: std::time::Duration,
}

impl Gateway {
    /// Load the catalog named by `cli.catalog`, register the reference
    /// kinds (§9 "explicit builder"), and run the topological resource
    /// initialization (§4.3). Any failure aborts startup.
    pub async fn new(cli: &Cli) -> Result<Self> {
        let bytes = std::fs::read(&cli.catalog)
            .map_err(|e| Error::Config(format!("reading catalog `{}`: {e}", cli.catalog.display())))?;

        let sources = source::build_registry();
        let auth_services = auth::build_registry();
        let tools = tool::build_registry();
        let registries = Registries {
            sources: &sources,
            auth_services: &auth_services,
            tools: &tools,
        };
        let catalog = catalog::load(&bytes, &registries)?;

        let instrumentation = Instrumentation::new();
        let tracer = Tracer::default();
        let manager = ResourceManager::initialize(catalog, &tracer).await?;

        let address: SocketAddr = format!("{}:{}", cli.address, cli.port)
            .parse()
            .map_err(|e| Error::Config(format!("invalid listen address: {e}")))?;

        if cli.disable_reload {
            info!("dynamic reload disabled (no-op: reload is not implemented)");
        }

        Ok(Self {
            manager: Arc::new(manager),
            instrumentation,
            address,
            shutdown_timeout: std::time::Duration::from_secs(cli.shutdown_timeout_secs),
        })
    }

    /// Bind the listener and serve until a shutdown signal arrives, then
    /// drain in-flight requests before returning.
    pub async fn run(self) -> Result<()> {
        info!(
            tools = self.manager.tools_map().len(),
            toolsets = self.manager.toolsets_map().len(),
            sources = self.manager.sources_map().len(),
            auth_services = self.manager.auth_services_map().len(),
            "resource graph initialized"
        );

        // Large initial permits; shutdown drains by acquiring them all back
        // (§5 "Cancellation": in-flight work must release its allocation).
        let inflight = Arc::new(tokio::sync::Semaphore::new(10_000));

        let state = Arc::new(AppState {
            manager: Arc::clone(&self.manager),
            instrumentation: self.instrumentation.clone(),
            inflight: Arc::clone(&inflight),
        });

        let app = create_router(state);
        let listener = TcpListener::bind(self.address)
            .await
            .map_err(|e| Error::Config(format!("binding `{}`: {e}", self.address)))?;

        info!(address = %self.address, "listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        info!(timeout = ?self.shutdown_timeout, "draining in-flight requests");
        match tokio::time::timeout(self.shutdown_timeout, inflight.acquire_many(10_000)).await {
            Ok(Ok(_permits)) => info!("all in-flight requests completed"),
            Ok(Err(_)) => warn!("inflight semaphore closed unexpectedly during drain"),
            Err(_) => {
                let remaining = 10_000_usize.saturating_sub(inflight.available_permits());
                warn!(remaining_requests = remaining, "drain timeout reached, proceeding with shutdown");
            }
        }

        Ok(())
    }
}

/// Waits for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn new_fails_on_missing_catalog_file() {
        let cli = Cli {
            catalog: "/nonexistent/catalog.yaml".into(),
            address: "127.0.0.1".to_string(),
            port: 0,
            log_level: "info".to_string(),
            log_format: "standard".to_string(),
            disable_reload: false,
            shutdown_timeout_secs: 1,
        };
        let result = Gateway::new(&cli).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn new_succeeds_on_empty_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.yaml");
        std::fs::write(&path, b"kind: toolsets\nname: s1\ntoolNames: []\n").unwrap();
        let cli = Cli {
            catalog: path,
            address: "127.0.0.1".to_string(),
            port: 0,
            log_level: "info".to_string(),
            log_format: "standard".to_string(),
            disable_reload: false,
            shutdown_timeout_secs: 1,
        };
        let gateway = Gateway::new(&cli).await.unwrap();
        assert_eq!(gateway.manager.toolsets_map().len(), 2);
    }
}
