use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chain_sol::Keypair;
use clap::{Parser, Subcommand};
use token_core::{
    BalanceReport, Cluster, EngineConfig, HistoryPage, KeypairSigner, LedgerClient, MemoryLedger,
    OperationResult, RawRequest, RpcClient, TokenEngine, TokenError, WalletSigner,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// Lamports granted to the caller in simulation mode.
const SIMULATED_AIRDROP: u64 = 10_000_000_000;
const LAMPORTS_PER_SOL: f64 = 1_000_000_000.0;

#[derive(Parser, Debug)]
#[command(name = "token-cli", about = "Create, mint and transfer SPL tokens")]
struct Cli {
    /// Keypair file in the 64-byte JSON array format.
    #[arg(long, env = "TOKEN_KEYPAIR", value_name = "PATH")]
    keypair: Option<PathBuf>,

    /// devnet, testnet, mainnet-beta or localnet.
    #[arg(long, env = "TOKEN_CLUSTER")]
    cluster: Option<Cluster>,

    /// Overrides the cluster's RPC endpoint.
    #[arg(long, env = "TOKEN_RPC_URL", value_name = "URL")]
    rpc_url: Option<String>,

    /// JSON engine configuration; flags override it.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Run against an in-process ledger instead of a cluster.
    #[arg(long)]
    simulate: bool,

    /// Print results as JSON.
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a new token, optionally minting an initial supply to yourself.
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        symbol: String,
        #[arg(long, default_value = "9")]
        decimals: String,
        #[arg(long, default_value = "0")]
        supply: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// Issue tokens of a mint you control.
    Mint {
        #[arg(long)]
        mint: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        amount: String,
        #[arg(long)]
        decimals: Option<String>,
    },
    /// Send tokens from your account.
    Transfer {
        #[arg(long)]
        mint: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        amount: String,
        #[arg(long)]
        decimals: Option<String>,
    },
    /// Native and token balances.
    Balances,
    /// Transaction history, newest first.
    History {
        #[arg(long)]
        limit: Option<usize>,
        /// Signature to continue after.
        #[arg(long)]
        cursor: Option<String>,
        /// Follow the cursor until history is exhausted.
        #[arg(long)]
        all: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = load_config(&cli)?;
    let signer = load_signer(&cli)?;
    let client = connect(&cli, &config, &signer)?;

    let engine = TokenEngine::new(config, client, signer).map_err(explain)?;
    info!(
        owner = %engine.owner(),
        cluster = %engine.config().cluster,
        endpoint = engine.config().rpc_endpoint(),
        "engine ready"
    );

    {
        let engine = engine.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted; abandoning confirmation");
                engine.shutdown();
            }
        });
    }

    match cli.command {
        Command::Create {
            name,
            symbol,
            decimals,
            supply,
            description,
        } => {
            let request = RawRequest::Create {
                name,
                symbol,
                decimals,
                initial_supply: supply,
                description,
            };
            let result = engine.execute_raw(&request).await.map_err(explain)?;
            print_result(&result, cli.json)?;
        }
        Command::Mint {
            mint,
            to,
            amount,
            decimals,
        } => {
            let request = RawRequest::MintTo {
                mint,
                recipient: to,
                amount,
                decimals,
            };
            let result = engine.execute_raw(&request).await.map_err(explain)?;
            print_result(&result, cli.json)?;
        }
        Command::Transfer {
            mint,
            to,
            amount,
            decimals,
        } => {
            let request = RawRequest::Transfer {
                mint,
                recipient: to,
                amount,
                decimals,
            };
            let result = engine.execute_raw(&request).await.map_err(explain)?;
            print_result(&result, cli.json)?;
        }
        Command::Balances => {
            let report = engine.balances().await.map_err(explain)?;
            print_balances(&report, cli.json)?;
        }
        Command::History { limit, cursor, all } => {
            if all {
                let mut pager = engine.history_pager();
                while let Some(page) = pager.next_page().await.map_err(explain)? {
                    print_history(&page, cli.json)?;
                }
            } else {
                let page = engine
                    .history(cursor.as_deref(), limit)
                    .await
                    .map_err(explain)?;
                print_history(&page, cli.json)?;
            }
        }
    }

    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,token_core=info,token_cli=info"));
    let _ = fmt().with_env_filter(env_filter).with_writer(std::io::stderr).try_init();
}

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            EngineConfig::from_json(&json).map_err(explain)?
        }
        None => EngineConfig::default(),
    };
    if let Some(cluster) = cli.cluster {
        config.cluster = cluster;
    }
    if let Some(url) = &cli.rpc_url {
        config.rpc_url = Some(url.clone());
    }
    if cli.simulate {
        config.cluster = Cluster::Localnet;
    }
    config.validate().map_err(explain)?;
    Ok(config)
}

fn load_signer(cli: &Cli) -> Result<KeypairSigner> {
    match &cli.keypair {
        Some(path) => KeypairSigner::from_file(path)
            .with_context(|| format!("loading keypair {}", path.display())),
        None if cli.simulate => Ok(KeypairSigner::new(Keypair::generate())),
        None => Err(anyhow!("--keypair is required unless --simulate is set")),
    }
}

fn connect(
    cli: &Cli,
    config: &EngineConfig,
    signer: &KeypairSigner,
) -> Result<Arc<dyn LedgerClient>> {
    if cli.simulate {
        let ledger = MemoryLedger::new();
        ledger.airdrop(&signer.pubkey(), SIMULATED_AIRDROP);
        return Ok(Arc::new(ledger));
    }
    if config.cluster.is_mainnet() {
        warn!("operating on mainnet-beta; transactions spend real funds");
    }
    let client = RpcClient::from_config(config)
        .map_err(|e| anyhow!("cannot build RPC client: {e}"))?;
    Ok(Arc::new(client))
}

fn explain(err: TokenError) -> anyhow::Error {
    anyhow!("{err} [{}]", err.kind())
}

fn print_result(result: &OperationResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }
    println!("{} {}", result.kind, result.amount);
    println!("  mint:      {}", result.mint);
    println!("  signature: {}", result.signature);
    match result.fee_paid {
        Some(fee) => println!("  fee:       {fee} lamports"),
        None => println!("  fee:       unknown"),
    }
    println!("  explorer:  {}", result.explorer_url);
    Ok(())
}

fn print_balances(report: &BalanceReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    println!(
        "{}: {:.9} SOL",
        report.owner,
        report.native_lamports as f64 / LAMPORTS_PER_SOL
    );
    if report.below_fee_budget {
        println!("  warning: native balance is low; transactions may fail");
    }
    for token in &report.tokens {
        println!(
            "  {} {:<10} {} ({:?})",
            token.mint,
            token.symbol.as_deref().unwrap_or("-"),
            token.amount(),
            token.origin
        );
    }
    Ok(())
}

fn print_history(page: &HistoryPage, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(page)?);
        return Ok(());
    }
    if let Some(warning) = &page.warning {
        println!("warning: {warning}");
    }
    for entry in &page.entries {
        let amount = entry.amount.map(|a| a.to_string()).unwrap_or_default();
        let mint = entry.mint.map(|m| m.short()).unwrap_or_default();
        println!(
            "{:>10} {:<9} {:>20} {:<12} {:?} {}",
            entry.timestamp.unwrap_or(0),
            entry.kind,
            amount,
            mint,
            entry.status,
            entry.signature
        );
    }
    if let Some(cursor) = &page.next_cursor {
        println!("more: --cursor {cursor}");
    }
    Ok(())
}
