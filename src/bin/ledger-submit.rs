use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use ledger_bridge::config::{load_config, load_from_env};
use ledger_bridge::observability::logging::init_logging;
use ledger_bridge::{MockLedger, Session};

#[derive(Parser)]
#[command(name = "ledger-submit")]
#[command(about = "Submit a data payload and wait for its finality receipt", long_about = None)]
struct Cli {
    /// JSON-RPC endpoint of the ledger
    #[arg(short, long, default_value = "http://localhost:8545")]
    endpoint: String,

    /// Mnemonic (optionally suffixed with //index) or hex private key
    #[arg(short, long, env = "LEDGER_BRIDGE_SEED")]
    seed: String,

    /// Payload to submit
    #[arg(short, long, default_value = "Hello from Rust")]
    data: String,

    /// Application id the payload is filed under
    #[arg(short, long, default_value_t = 2)]
    app_id: i32,

    /// TOML configuration file (defaults to LEDGER_BRIDGE_CONFIG, then built-ins)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run against an in-memory ledger instead of the endpoint
    #[arg(long)]
    offline: bool,

    /// Print the receipt as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => load_from_env()?,
    };
    init_logging(&config.observability.log_level);

    let session = if cli.offline {
        Session::with_rpc(Arc::new(MockLedger::new()), config)?
    } else {
        Session::connect(&cli.endpoint, config)?
    };

    tracing::info!(endpoint = session.endpoint(), chain_id = session.chain_id(), "Connected");

    let signer = session.initialize_signer(&cli.seed)?;
    let submission = session.submit_data(signer, cli.data.as_bytes(), cli.app_id)?;
    let receipt = session.transaction_receipt(submission)?;
    let record = session.receipt(receipt)?;

    if cli.json {
        let output = serde_json::json!({
            "block_height": record.block_height,
            "block_hash": format!("0x{}", hex::encode(record.block_hash)),
            "transaction_index": record.transaction_index,
            "transaction_hash": format!("0x{}", hex::encode(record.transaction_hash)),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("Block height:      {}", record.block_height);
        println!("Block hash:        0x{}", hex::encode(record.block_hash));
        println!("Transaction index: {}", record.transaction_index);
        println!("Transaction hash:  0x{}", hex::encode(record.transaction_hash));
    }

    session.release_receipt(receipt)?;
    session.release_submission(submission)?;
    session.release_signer(signer)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_bridge::blockchain::client::parse_endpoint;

    #[test]
    fn test_default_endpoint_is_local_node() {
        let cli = Cli::try_parse_from(["ledger-submit", "--seed", "0xabc"]).unwrap();
        assert_eq!(cli.endpoint, "http://localhost:8545");
        assert!(parse_endpoint(&cli.endpoint).is_ok());
        assert_eq!(cli.app_id, 2);
        assert!(!cli.offline);
    }
}
