use std::net::SocketAddr;
use std::path::PathBuf;

use clap::builder::RangedU64ValueParser;
use clap::Args;

/// Startup configuration of the plugin server. Every flag has an environment
/// fallback so the server can run unchanged under a process supervisor.
#[derive(Debug, Clone, Args)]
pub struct ServeConfig {
    /// Port to listen on.
    #[arg(long, env = "COLOPS_PORT", default_value_t = 50053)]
    pub port: u16,

    /// Directory holding sse_server_key.pem, sse_server_cert.pem and
    /// root_cert.pem. Without it the server runs in insecure mode.
    #[arg(long, env = "COLOPS_PEM_DIR")]
    pub pem_dir: Option<PathBuf>,

    /// JSON file declaring the exposed functions.
    #[arg(long, env = "COLOPS_DEFINITION_FILE", default_value = "functions.json")]
    pub definition_file: PathBuf,

    /// CSV table with `userid` and `userrole` columns.
    #[arg(long, env = "COLOPS_USERS_FILE", default_value = "users.csv")]
    pub users_file: PathBuf,

    /// SQLite database queried by GetResultCols and GetResultTable.
    #[arg(long, env = "COLOPS_DATABASE", default_value = "customer.db")]
    pub database: PathBuf,

    #[arg(long, env = "COLOPS_USD_INR_RATE", default_value_t = 83.0)]
    pub usd_inr_rate: f64,

    #[arg(long, env = "COLOPS_USD_GBP_RATE", default_value_t = 0.79)]
    pub usd_gbp_rate: f64,

    /// Maximum number of invocations evaluated concurrently.
    #[arg(
        long,
        env = "COLOPS_WORKERS",
        default_value_t = 10,
        value_parser = RangedU64ValueParser::<usize>::new().range(1..)
    )]
    pub workers: usize,
}

impl ServeConfig {
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Wrapper {
        #[command(flatten)]
        config: ServeConfig,
    }

    #[test]
    fn defaults() {
        let config = Wrapper::try_parse_from(["colops"]).unwrap().config;
        assert_eq!(config.port, 50053);
        assert_eq!(config.workers, 10);
        assert_eq!(config.definition_file, PathBuf::from("functions.json"));
        assert!(config.pem_dir.is_none());
        assert_eq!(config.bind_addr().port(), 50053);
    }

    #[test]
    fn flags_override_defaults() {
        let config = Wrapper::try_parse_from([
            "colops",
            "--port",
            "6000",
            "--pem-dir",
            "/etc/colops/pem",
            "--usd-gbp-rate",
            "0.8",
            "--workers",
            "4",
        ])
        .unwrap()
        .config;
        assert_eq!(config.port, 6000);
        assert_eq!(config.pem_dir, Some(PathBuf::from("/etc/colops/pem")));
        assert_eq!(config.usd_gbp_rate, 0.8);
        assert_eq!(config.workers, 4);
    }

    #[test]
    fn zero_workers_is_rejected() {
        assert!(Wrapper::try_parse_from(["colops", "--workers", "0"]).is_err());
    }
}
