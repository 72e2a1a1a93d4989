use std::path::{Path, PathBuf};

use thiserror::Error;
use tonic::transport::{Certificate, Identity, ServerTlsConfig};

pub const SERVER_KEY: &str = "sse_server_key.pem";
pub const SERVER_CERT: &str = "sse_server_cert.pem";
pub const ROOT_CERT: &str = "root_cert.pem";

#[derive(Debug, Error)]
#[error("cannot read {}: {source}", path.display())]
pub struct TlsError {
    path: PathBuf,
    #[source]
    source: std::io::Error,
}

/// Mutual TLS from a PEM directory. All three files must be present; clients
/// must present a certificate signed by the root.
pub fn load(dir: &Path) -> Result<ServerTlsConfig, TlsError> {
    let read = |name: &str| {
        let path = dir.join(name);
        std::fs::read(&path).map_err(|source| TlsError { path, source })
    };
    let key = read(SERVER_KEY)?;
    let cert = read(SERVER_CERT)?;
    let root = read(ROOT_CERT)?;

    Ok(ServerTlsConfig::new()
        .identity(Identity::from_pem(cert, key))
        .client_ca_root(Certificate::from_pem(root)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_three_files_are_required() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SERVER_KEY), "key").unwrap();
        std::fs::write(dir.path().join(SERVER_CERT), "cert").unwrap();

        let err = load(dir.path()).unwrap_err();
        assert!(err.to_string().contains(ROOT_CERT));

        std::fs::write(dir.path().join(ROOT_CERT), "root").unwrap();
        assert!(load(dir.path()).is_ok());
    }
}
