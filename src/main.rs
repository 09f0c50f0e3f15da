//! por-link - Shared Substrate node session tooling for the Proof of Reserve dashboard.

mod cli;

use std::sync::Arc;
use std::time::Duration;

use cli::{Cli, Command};
use por_link::config::Config;
use por_link::display::short_address;
use por_link::connection::ConnectionManager;
use por_link::error::{PorError, Result};
use por_link::logging;
use por_link::peg::PegStatus;
use por_link::transport::WsTransport;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let cli = Cli::parse_args();

    if cli.log_file {
        logging::init_file_logging();
    } else {
        logging::init_stderr_logging();
    }

    if let Err(e) = run(cli).await {
        error!("{}: {}", e.category(), e);
        eprintln!("{}: {}", e.category(), e.message());
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command.clone() {
        Command::Status {
            endpoint,
            node,
            ready_timeout,
            json,
        } => status(&cli, endpoint, node, ready_timeout, json).await,
        Command::Peg {
            reserves,
            circulation,
            custodian,
            json,
        } => peg(reserves, circulation, custodian.as_deref(), json),
    }
}

async fn status(
    cli: &Cli,
    endpoint: Option<String>,
    node: Option<String>,
    ready_timeout: Option<u64>,
    json: bool,
) -> Result<()> {
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let config = Config::load_from_file(&config_path)?;

    let endpoint = config.resolve_endpoint(endpoint.as_deref(), node.as_deref())?;
    let mut settings = config.connection_settings(endpoint);
    if let Some(secs) = ready_timeout {
        settings = settings.with_ready_timeout(Duration::from_secs(secs));
    }

    let transport = WsTransport::new().with_request_timeout(config.request_timeout());
    let manager = ConnectionManager::new(Arc::new(transport), settings);

    let handle = manager.connect(None).await?;
    let status = manager.status();

    if json {
        let out = serde_json::to_string_pretty(&status)
            .map_err(|e| PorError::internal(format!("Failed to encode status: {e}")))?;
        println!("{out}");
    } else {
        println!("Endpoint: {}", handle.endpoint().display_string());
        println!("State:    {}", status.state);
        match handle.node_info() {
            Some(node) => {
                println!("Chain:    {}", node.chain);
                println!("Version:  {}", node.version);
            }
            None => println!("Chain:    unknown"),
        }
        println!("Uptime:   {:.1?}", handle.uptime());
    }

    drop(handle);
    manager.disconnect().await
}

fn peg(reserves: f64, circulation: f64, custodian: Option<&str>, json: bool) -> Result<()> {
    let status = PegStatus::compute(reserves, circulation)?;

    if json {
        let mut value = serde_json::to_value(&status)
            .map_err(|e| PorError::internal(format!("Failed to encode peg status: {e}")))?;
        if let (Some(custodian), Some(fields)) = (custodian, value.as_object_mut()) {
            fields.insert("custodian".to_string(), custodian.into());
        }
        let out = serde_json::to_string_pretty(&value)
            .map_err(|e| PorError::internal(format!("Failed to encode peg status: {e}")))?;
        println!("{out}");
    } else {
        if let Some(custodian) = custodian {
            println!("Custodian:   {}", short_address(custodian));
        }
        println!("Reserves:    {}", status.reserves);
        println!("Circulation: {}", status.circulation);
        println!("Peg ratio:   {status}");
    }

    Ok(())
}
