//! `plastic-hub` command line tool: run a hub, send a one-shot request,
//! or self-test a running hub.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use plastic_hub::logging::init_tracing;
use plastic_hub::{client, HubConfig, HubService, HubTester, Identifier, PlasticHub, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[derive(Debug, Clone, Default, Args)]
struct GlobalOptions {
    /// Rendezvous file to publish or read instead of ~/.plastic
    #[arg(long, value_name = "FILE", global = true)]
    rendezvous: Option<PathBuf>,
}

#[derive(Parser)]
#[command(
    name = "plastic-hub",
    version,
    about = "PLASTIC message hub",
    long_about = None
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a hub until interrupted
    Hub(HubArgs),
    /// Send one request through the running hub and print the answers
    Request(RequestArgs),
    /// Exercise the running hub and fail on any discrepancy
    Test,
}

#[derive(Args)]
struct HubArgs {
    /// Log every registration, request and response
    #[arg(long)]
    verbose: bool,
    /// Check traffic against known message definitions and log problems
    #[arg(long)]
    warnings: bool,
    /// Log the list of registered peers whenever it changes
    #[arg(long)]
    watch: bool,
    /// TOML configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Args)]
struct RequestArgs {
    /// Message identifier
    message: String,
    /// Message arguments; integers, decimals and true/false are typed,
    /// everything else is sent as a string
    args: Vec<String>,
    /// Send only to this peer
    #[arg(long, value_name = "ID")]
    target: Option<String>,
    /// Do not wait for answers
    #[arg(long)]
    asynch: bool,
    /// Name to register under while sending
    #[arg(long, default_value = "plastic-hub-request")]
    name: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let exit_code = match run_cli(cli).await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("plastic-hub: {:#}", e);
            1
        }
    };
    process::exit(exit_code);
}

async fn run_cli(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Hub(args) => run_hub(args, cli.global).await,
        Command::Request(args) => {
            init_tracing(false)?;
            run_request(args, &rendezvous_path(&cli.global)?).await
        }
        Command::Test => {
            init_tracing(false)?;
            let hub = client::connect_xmlrpc_at(&rendezvous_path(&cli.global)?)
                .await
                .context("no hub to test")?;
            HubTester::new(Arc::new(hub)).run().await?;
            println!("Hub test passed");
            Ok(())
        }
    }
}

fn rendezvous_path(global: &GlobalOptions) -> Result<PathBuf> {
    match &global.rendezvous {
        Some(path) => Ok(path.clone()),
        None => plastic_hub::rendezvous::default_path()
            .ok_or_else(|| anyhow!("no home directory; use --rendezvous")),
    }
}

async fn run_hub(args: HubArgs, global: GlobalOptions) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => HubConfig::load(path)?,
        None => HubConfig::default(),
    };
    if global.rendezvous.is_some() {
        config = config.with_rendezvous_file(global.rendezvous);
    }
    let verbose = config.verbose || args.verbose;
    let validate = config.validate || args.warnings;
    config = config.with_verbose(verbose).with_validation(validate);
    init_tracing(config.verbose)?;

    let hub = PlasticHub::start(config).await?;
    if let Some(url) = hub.xmlrpc_url().await {
        println!("PLASTIC hub running, HTTP-RPC at {}", url);
    }
    if let Some(path) = hub.config().rendezvous_path() {
        println!("Rendezvous file {}", path.display());
    }

    let watcher = args.watch.then(|| tokio::spawn(watch_peers(hub.clone())));
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for interrupt")?;
    info!("Interrupted; stopping hub");
    if let Some(watcher) = watcher {
        watcher.abort();
    }
    hub.stop().await;
    Ok(())
}

/// Logs the peer list whenever it changes
async fn watch_peers(hub: Arc<PlasticHub>) {
    let mut last = BTreeMap::new();
    let mut ticker = tokio::time::interval(Duration::from_millis(500));
    loop {
        ticker.tick().await;
        let current: BTreeMap<String, String> = hub
            .get_registered_ids()
            .into_iter()
            .map(|id| {
                let name = hub.get_name(&id).unwrap_or_default();
                (id.to_string(), name)
            })
            .collect();
        if current != last {
            let listing: Vec<String> = current
                .iter()
                .map(|(id, name)| format!("{} ({})", name, id))
                .collect();
            info!("{} registered: {}", current.len(), listing.join(", "));
            last = current;
        }
    }
}

fn parse_arg(text: &str) -> Value {
    if let Ok(i) = text.parse::<i32>() {
        Value::Int(i)
    } else if let Ok(d) = text.parse::<f64>() {
        Value::Double(d)
    } else if let Ok(b) = text.parse::<bool>() {
        Value::Bool(b)
    } else {
        Value::from(text)
    }
}

async fn run_request(args: RequestArgs, rendezvous: &Path) -> Result<()> {
    let hub = client::connect_xmlrpc_at(rendezvous)
        .await
        .context("can't reach hub")?;
    let message = Identifier::parse(&args.message)?;
    let values: Vec<Value> = args.args.iter().map(|a| parse_arg(a)).collect();

    if args.asynch {
        if args.target.is_some() {
            bail!("--target and --asynch can't be combined");
        }
        client::single_request_asynch(&hub, &args.name, &message, &values).await?;
        return Ok(());
    }

    if let Some(target) = &args.target {
        let target = Identifier::parse(target)?;
        match client::target_request(&hub, &args.name, &message, &values, &target).await? {
            Some(value) => println!("{}", value),
            None => {
                error!("No answer from {}", target);
                bail!("{} did not answer", target);
            }
        }
        return Ok(());
    }

    let sender = hub.register_no_callback(&args.name).await?;
    let results = hub.request(&sender, &message, &values).await;
    hub.unregister(&sender).await?;
    let mut lines = Vec::new();
    for (id, value) in results? {
        let name = hub.get_name(&id).await?.unwrap_or_default();
        lines.push(format!("{} ({}): {}", name, id, value));
    }
    lines.sort();
    for line in lines {
        println!("{}", line);
    }
    Ok(())
}
