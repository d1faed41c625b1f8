//! `metarelay` command line: relay service and holder-side tools.
//!
//! # Usage
//!
//! ```bash
//! # Run the relay service with config.toml from the current directory
//! metarelay serve
//!
//! # Sign `register("alice")` on the mumbai registry as the holder
//! HOLDER_PRIVATE_KEY=0x... metarelay sign --deployment mumbai --register alice
//!
//! # Dump registrations reconciled from the chain
//! metarelay events --deployment mumbai --from-block 25000000
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG` - Path to TOML configuration file (default: `config.toml`)
//! - `HOST` / `PORT` - Override the bind address
//! - `HOLDER_PRIVATE_KEY` - Holder key for `sign`
//! - `RUST_LOG` - Log level filter (default: `info`)
//!
//! A `.env` file in the working directory is loaded first.

use std::error::Error;
use std::net::SocketAddr;
use std::pin::pin;
use std::sync::Arc;

use alloy_primitives::{Address, Bytes, U256};
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::SolCall;
use axum::http::Method;
use clap::{Args, Parser, Subcommand};
use futures_util::TryStreamExt;
use metarelay::{EventPoller, EventReconciler, Pipeline, RegistrationLedger};
use metarelay_evm::contract::IRegistry;
use metarelay_evm::{AlloyChainRpc, LocalSigningProvider};
use tower_http::cors;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use metarelay_relayer::config::{RelayerConfig, parse_key};
use metarelay_relayer::poller::run_event_poller;
use metarelay_relayer::shutdown::Shutdown;
use metarelay_relayer::{Relayer, relayer_router};

#[derive(Debug, Parser)]
#[command(name = "metarelay", version, about = "EIP-712 meta-transaction relayer")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP relay service (default).
    Serve,
    /// Build and sign a forward request as the holder; prints it as JSON.
    Sign(SignArgs),
    /// Print the registrations of a deployment in chain order.
    Events(EventsArgs),
}

#[derive(Debug, Args)]
struct SignArgs {
    /// Deployment tag from the configuration.
    #[arg(long)]
    deployment: String,
    /// Contract to call (default: the deployment's target).
    #[arg(long)]
    to: Option<Address>,
    /// Hex-encoded call data.
    #[arg(long, conflicts_with = "register", required_unless_present = "register")]
    data: Option<Bytes>,
    /// Encode `register(name)` instead of passing `--data`.
    #[arg(long)]
    register: Option<String>,
    /// Native value forwarded with the call, in wei.
    #[arg(long)]
    value: Option<U256>,
    /// Holder private key.
    #[arg(long, env = "HOLDER_PRIVATE_KEY", hide_env_values = true)]
    key: String,
}

#[derive(Debug, Args)]
struct EventsArgs {
    /// Deployment tag from the configuration.
    #[arg(long)]
    deployment: String,
    /// First block (default: the deployment's scan start).
    #[arg(long)]
    from_block: Option<u64>,
    /// Last block (default: the current head).
    #[arg(long)]
    to_block: Option<u64>,
    /// Only events registered by this account.
    #[arg(long)]
    who: Option<Address>,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        tracing::error!("metarelay failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let config = RelayerConfig::load()?;
    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Sign(args) => sign(&config, args).await,
        Command::Events(args) => events(&config, args).await,
    }
}

async fn serve(config: RelayerConfig) -> Result<(), Box<dyn Error>> {
    tracing::info!(
        host = %config.host,
        port = config.port,
        deployments = config.deployments.len(),
        "Loaded configuration"
    );
    if config.deployments.is_empty() {
        tracing::warn!("No deployments configured, every relay request will be refused");
    }

    let signer = config.relayer_signer()?;
    let relayer_address = signer.address();
    let shutdown = Shutdown::install()?;

    let mut relayer = Relayer::new();
    for (tag, entry) in &config.deployments {
        let rpc = AlloyChainRpc::connect(entry.url()?, signer.clone(), entry.rpc_rate_limit);
        let poller = EventPoller::new(rpc.clone(), &entry.contract);
        relayer.insert(tag.clone(), rpc, entry.contract.clone(), poller.ledger());
        shutdown.spawn(run_event_poller(
            tag.clone(),
            poller,
            config.event_poll_interval(),
            shutdown.token(),
        ));
        tracing::info!(
            deployment = %tag,
            chain_id = entry.contract.chain_id,
            forwarder = %entry.contract.forwarder,
            relayer = %relayer_address,
            "Registered deployment"
        );
    }

    let app = relayer_router(Arc::new(relayer))
        .layer(TraceLayer::new_for_http())
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(cors::Any),
        );

    let addr = SocketAddr::new(config.host, config.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Relayer listening on http://{addr}");

    let token = shutdown.token();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await?;

    shutdown.drain().await;
    tracing::info!("Relayer shut down gracefully");
    Ok(())
}

#[allow(clippy::print_stdout)]
async fn sign(config: &RelayerConfig, args: SignArgs) -> Result<(), Box<dyn Error>> {
    let entry = config.deployment(&args.deployment)?;
    let key = parse_key("holder key", &args.key)?;
    let holder = key.address();

    let rpc = AlloyChainRpc::connect(entry.url()?, key.clone(), entry.rpc_rate_limit);
    let pipeline = Pipeline::new(rpc, LocalSigningProvider::new(key), entry.contract.clone());
    let session = pipeline.connect(holder)?;

    let call_data = match (args.data, args.register) {
        (Some(data), _) => data,
        (None, Some(name)) => IRegistry::registerCall { name }.abi_encode().into(),
        (None, None) => return Err("either --data or --register is required".into()),
    };
    let mut intent = session.intent(args.to.unwrap_or(entry.contract.target), call_data);
    if let Some(value) = args.value {
        intent = intent.with_value(value);
    }

    let _round = session.begin_round()?;
    let signed = pipeline.authorize(&session, &intent).await?;
    tracing::info!(
        %holder,
        nonce = %signed.request.nonce,
        gas = %signed.request.gas_limit,
        "Signed forward request"
    );
    println!("{}", serde_json::to_string_pretty(&signed)?);
    Ok(())
}

#[allow(clippy::print_stdout)]
async fn events(config: &RelayerConfig, args: EventsArgs) -> Result<(), Box<dyn Error>> {
    let entry = config.deployment(&args.deployment)?;
    let contract = &entry.contract;
    // Read-only: the wallet filler never signs anything here.
    let reader = config
        .relayer_signer()
        .unwrap_or_else(|_| PrivateKeySigner::random());
    let rpc = AlloyChainRpc::connect(entry.url()?, reader, entry.rpc_rate_limit);
    let reconciler = EventReconciler::new(rpc, contract);

    let to_block = match args.to_block {
        Some(block) => block,
        None => reconciler.head().await?,
    };
    let from_block = args.from_block.unwrap_or(contract.event_scan_from_block);

    let mut ledger = RegistrationLedger::new();
    let mut batches = pin!(reconciler.registrations(
        contract.target,
        &contract.event_signature,
        from_block,
        to_block,
    ));
    while let Some(batch) = batches.try_next().await? {
        ledger.apply(batch);
    }

    let events: Vec<_> = match args.who {
        Some(who) => ledger.by_account(who).collect(),
        None => ledger.events().collect(),
    };
    tracing::info!(from_block, to_block, count = events.len(), "Reconciled registrations");
    println!("{}", serde_json::to_string_pretty(&events)?);
    Ok(())
}
