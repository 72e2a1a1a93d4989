use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colops_core::{ColumnOps, PLUGIN_IDENTIFIER, PLUGIN_VERSION};
use colops_lookup::create_demo_database;
use colops_server::ServeConfig;
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

#[derive(Parser)]
#[command(name = "colops", version, args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    serve: ServeConfig,
}

#[derive(Subcommand)]
enum Command {
    /// Create the demo CUSTOMER database.
    CreateDb {
        #[arg(long, env = "COLOPS_DATABASE", default_value = "customer.db")]
        database: PathBuf,
    },
    /// Print the functions the server would report, after validating them.
    Capabilities {
        #[arg(long, env = "COLOPS_DEFINITION_FILE", default_value = "functions.json")]
        definition_file: PathBuf,
    },
}

fn init_logging() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(%err, "cannot listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

async fn serve(config: ServeConfig) -> anyhow::Result<()> {
    let registry = colops_server::build_registry(&config)?;
    let tls = colops_server::tls_config(&config)?;
    let listener = colops_server::bind(config.bind_addr()).await?;
    let mode = if tls.is_some() { "secure" } else { "insecure" };
    tracing::info!(
        addr = %listener.local_addr()?,
        workers = config.workers,
        "running {PLUGIN_IDENTIFIER} {PLUGIN_VERSION} in {mode} mode"
    );
    let service = ColumnOps::new(registry, config.workers);
    colops_server::serve(listener, service, tls, shutdown_signal()).await?;
    Ok(())
}

fn print_capabilities(config: ServeConfig) -> anyhow::Result<()> {
    let registry = colops_server::build_registry(&config)?;
    println!("{PLUGIN_IDENTIFIER} {PLUGIN_VERSION} (scripts allowed)");
    for f in registry.describe()? {
        let params: Vec<String> = f
            .params
            .iter()
            .map(|p| format!("{}: {:?}", p.name, p.ty))
            .collect();
        println!(
            "{:>3}  {:<16} {:<12} ({}) -> {:?}",
            f.id,
            f.name,
            f.kind.name(),
            params.join(", "),
            f.return_type
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        None => serve(cli.serve).await?,
        Some(Command::CreateDb { database }) => {
            let rows = create_demo_database(&database)?;
            println!("created {} with {rows} customers", database.display());
        }
        Some(Command::Capabilities { definition_file }) => {
            let mut config = cli.serve;
            config.definition_file = definition_file;
            print_capabilities(config)?
        }
    }

    Ok(())
}
