use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use colops_core::ColumnOps;
use colops_eval::{standard_registry, Lookups};
use colops_lookup::{CsvRoleTable, SqliteStore, StaticRates};
use colops_registry::{FunctionCatalog, Registry, RegistryError};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::{Server, ServerTlsConfig};

pub mod config;
pub mod tls;

pub use config::ServeConfig;
pub use tls::TlsError;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Tls(#[from] TlsError),
    #[error("cannot listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("server failed: {0}")]
    Transport(#[from] tonic::transport::Error),
}

pub fn lookups(config: &ServeConfig) -> Lookups {
    for (what, path) in [("user table", &config.users_file), ("database", &config.database)] {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "{what} not found; calls that need it will fail");
        }
    }
    Lookups {
        rates: StaticRates::new(config.usd_inr_rate, config.usd_gbp_rate),
        roles: Arc::new(CsvRoleTable::new(&config.users_file)),
        store: Arc::new(SqliteStore::new(&config.database)),
    }
}

/// Bind the built-in evaluators and check them against the declaration file.
pub fn build_registry(config: &ServeConfig) -> Result<Arc<Registry>, StartupError> {
    let catalog = FunctionCatalog::new(&config.definition_file);
    let registry = standard_registry(catalog, &lookups(config));
    let functions = registry.validate()?;
    tracing::info!(
        functions = functions.len(),
        path = %config.definition_file.display(),
        "function catalogue loaded"
    );
    Ok(Arc::new(registry))
}

/// TLS settings for the configured PEM directory, if any.
pub fn tls_config(config: &ServeConfig) -> Result<Option<ServerTlsConfig>, StartupError> {
    Ok(config.pem_dir.as_deref().map(tls::load).transpose()?)
}

pub async fn bind(addr: SocketAddr) -> Result<TcpListener, StartupError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| StartupError::Bind { addr, source })
}

/// Serve `service` on `listener` until `shutdown` resolves.
pub async fn serve<F>(
    listener: TcpListener,
    service: ColumnOps,
    tls: Option<ServerTlsConfig>,
    shutdown: F,
) -> Result<(), StartupError>
where
    F: Future<Output = ()>,
{
    let mut builder = Server::builder();
    if let Some(tls) = tls {
        builder = builder.tls_config(tls)?;
    }
    builder
        .add_service(service.into_server())
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
        .await?;
    Ok(())
}
