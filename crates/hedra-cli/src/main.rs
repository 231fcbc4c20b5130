//! # Hedra CLI Entry Point
//!
//! Inspects a ledger network from the command line.
//!
//! ## Usage
//!
//! ```bash
//! # Ping every consensus node of testnet
//! hedra ping
//!
//! # Show nodes of a config-described network in selection order, with health
//! hedra --config client.json network
//!
//! # Query a balance (free) or a receipt
//! hedra balance 0.0.1001
//! hedra receipt 0.0.1001@1700000000.000000000
//!
//! # Transfer tinybar from the configured operator
//! hedra --config client.json transfer 0.0.1002 --amount 100
//! ```
//!
//! Output goes to stdout as JSON; logs go to stderr and follow `RUST_LOG`.

use anyhow::{Context, Result};
use argh::FromArgs;
use hedra_client::{AccountBalanceQuery, Client, Transaction, TransactionReceiptQuery};
use hedra_common::{AccountId, TransactionId};
use hedra_network::{sort_by_health, NetworkName};
use serde_json::json;
use std::path::PathBuf;

#[derive(FromArgs)]
/// Hedra - distributed ledger network client
struct Cli {
    /// path to a JSON client config; overrides --network
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// preset network to use when no config is given
    ///
    /// One of mainnet, testnet or previewnet. Defaults to testnet.
    #[argh(option, short = 'n', default = "\"testnet\".into()")]
    network: String,

    /// maximum attempts per request
    #[argh(option)]
    max_attempts: Option<u32>,

    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Ping(PingArgs),
    Network(NetworkArgs),
    Balance(BalanceArgs),
    Receipt(ReceiptArgs),
    Transfer(TransferArgs),
}

#[derive(FromArgs)]
#[argh(subcommand, name = "ping")]
/// ping every consensus node
struct PingArgs {}

#[derive(FromArgs)]
#[argh(subcommand, name = "network")]
/// print consensus nodes in selection order with their health
struct NetworkArgs {}

#[derive(FromArgs)]
#[argh(subcommand, name = "balance")]
/// query the balance of an account
struct BalanceArgs {
    /// account to query, as `shard.realm.num`
    #[argh(positional)]
    account: String,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "receipt")]
/// fetch the receipt of a transaction
struct ReceiptArgs {
    /// transaction id, as `payer@seconds.nanos`
    #[argh(positional)]
    transaction_id: String,

    /// node to ask; defaults to the healthiest nodes
    #[argh(option)]
    node: Option<String>,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "transfer")]
/// transfer tinybar from the operator account
struct TransferArgs {
    /// receiving account
    #[argh(positional)]
    to: String,

    /// amount in tinybar
    #[argh(option, short = 'a')]
    amount: i64,

    /// transaction memo
    #[argh(option, default = "String::new()")]
    memo: String,
}

fn build_client(cli: &Cli) -> Result<Client> {
    let client = match &cli.config {
        Some(path) => Client::from_config_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => {
            let name: NetworkName = cli.network.parse()?;
            Client::for_name(name)
        }
    };
    if let Some(max_attempts) = cli.max_attempts {
        client.set_max_attempts(max_attempts);
    }
    Ok(client)
}

fn parse_account(s: &str) -> Result<AccountId> {
    s.parse::<AccountId>()
        .with_context(|| format!("invalid account `{}`", s))
}

async fn run(cli: Cli) -> Result<()> {
    let client = build_client(&cli)?;

    let output = match cli.command {
        Commands::Ping(_) => {
            let failures = client.ping_all().await;
            let mut nodes = client.network().node_account_ids();
            nodes.sort();
            let report: Vec<_> = nodes
                .iter()
                .map(|node| {
                    let error = failures
                        .iter()
                        .find(|(failed, _)| failed == node)
                        .map(|(_, e)| e.to_string());
                    json!({ "node": node.to_string(), "ok": error.is_none(), "error": error })
                })
                .collect();
            json!(report)
        }
        Commands::Network(_) => {
            let mut nodes = client.network().pool().nodes();
            sort_by_health(&mut nodes);
            let consensus: Vec<_> = nodes
                .iter()
                .map(|node| {
                    json!({
                        "node": node.key().to_string(),
                        "address": node.address().to_string(),
                        "healthy": node.is_healthy(),
                        "failedAttempts": node.failed_attempts(),
                        "useCount": node.use_count(),
                        "backoffMs": node.remaining_backoff().as_millis() as u64,
                    })
                })
                .collect();
            let mirror = client
                .mirror_network()
                .map(|mirror| mirror.addresses())
                .unwrap_or_default();
            json!({ "network": consensus, "mirrorNetwork": mirror })
        }
        Commands::Balance(args) => {
            let account = parse_account(&args.account)?;
            let balance = AccountBalanceQuery::new(account).execute(&client).await?;
            json!({ "account": balance.account_id.to_string(), "hbars": balance.hbars })
        }
        Commands::Receipt(args) => {
            let transaction_id: TransactionId = args
                .transaction_id
                .parse()
                .with_context(|| format!("invalid transaction id `{}`", args.transaction_id))?;
            let mut query = TransactionReceiptQuery::new(transaction_id);
            if let Some(node) = &args.node {
                query.set_node_account_ids(vec![parse_account(node)?]);
            }
            let receipt = query.execute(&client).await?;
            json!({
                "transactionId": transaction_id.to_string(),
                "status": receipt.status.to_string(),
                "accountId": receipt.account_id.map(|id| id.to_string()),
                "fileId": receipt.file_id.map(|id| id.to_string()),
                "topicSequenceNumber": receipt.topic_sequence_number,
            })
        }
        Commands::Transfer(args) => {
            let payer = client
                .operator_account_id()
                .context("transfer needs an operator; pass --config with an operator section")?;
            let to = parse_account(&args.to)?;
            let mut transaction = Transaction::transfer([(payer, -args.amount), (to, args.amount)]);
            transaction.set_memo(args.memo)?;

            let response = transaction.execute(&client).await?;
            tracing::info!(transaction_id = %response.transaction_id, node = %response.node_account_id, "transfer submitted");
            let receipt = response.get_receipt(&client).await?;
            json!({
                "transactionId": response.transaction_id.to_string(),
                "node": response.node_account_id.to_string(),
                "hash": hex::encode(&response.transaction_hash),
                "status": receipt.status.to_string(),
            })
        }
    };

    client.close().await;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // Logs go to stderr so that stdout stays machine-readable
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    run(cli).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_ping_defaults() {
        let cli: Cli = Cli::from_args(&["hedra"], &["ping"]).unwrap();
        assert!(cli.config.is_none());
        assert_eq!(cli.network, "testnet");
        assert!(cli.max_attempts.is_none());
        assert!(matches!(cli.command, Commands::Ping(_)));
    }

    #[test]
    fn test_cli_parse_global_options() {
        let cli: Cli = Cli::from_args(
            &["hedra"],
            &["--config", "client.json", "--max-attempts", "3", "network"],
        )
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("client.json")));
        assert_eq!(cli.max_attempts, Some(3));
        assert!(matches!(cli.command, Commands::Network(_)));
    }

    #[test]
    fn test_cli_parse_balance() {
        let cli: Cli = Cli::from_args(&["hedra"], &["-n", "mainnet", "balance", "0.0.1001"]).unwrap();
        assert_eq!(cli.network, "mainnet");
        match cli.command {
            Commands::Balance(BalanceArgs { account }) => assert_eq!(account, "0.0.1001"),
            _ => panic!("Expected Balance command"),
        }
    }

    #[test]
    fn test_cli_parse_receipt_with_node() {
        let cli: Cli = Cli::from_args(
            &["hedra"],
            &["receipt", "0.0.2@1700000000.000000001", "--node", "0.0.3"],
        )
        .unwrap();
        match cli.command {
            Commands::Receipt(ReceiptArgs { transaction_id, node }) => {
                assert_eq!(transaction_id, "0.0.2@1700000000.000000001");
                assert_eq!(node, Some("0.0.3".to_string()));
            }
            _ => panic!("Expected Receipt command"),
        }
    }

    #[test]
    fn test_cli_parse_transfer() {
        let cli: Cli = Cli::from_args(&["hedra"], &["transfer", "0.0.1002", "-a", "250"]).unwrap();
        match cli.command {
            Commands::Transfer(TransferArgs { to, amount, memo }) => {
                assert_eq!(to, "0.0.1002");
                assert_eq!(amount, 250);
                assert_eq!(memo, "");
            }
            _ => panic!("Expected Transfer command"),
        }
    }

    #[test]
    fn test_cli_requires_amount_for_transfer() {
        assert!(Cli::from_args(&["hedra"], &["transfer", "0.0.1002"]).is_err());
    }

    #[test]
    fn test_build_client_for_preset_network() {
        let cli: Cli = Cli::from_args(&["hedra"], &["--max-attempts", "2", "ping"]).unwrap();
        let client = build_client(&cli).unwrap();
        assert_eq!(client.network().node_account_ids().len(), 5);
        assert_eq!(client.execution_config().max_attempts, 2);
    }

    #[test]
    fn test_build_client_rejects_unknown_network() {
        let cli: Cli = Cli::from_args(&["hedra"], &["-n", "devnet", "ping"]).unwrap();
        assert!(build_client(&cli).is_err());
    }

    #[test]
    fn test_parse_account() {
        assert_eq!(parse_account("0.0.7").unwrap(), AccountId::from(7));
        assert!(parse_account("seven").is_err());
    }
}
