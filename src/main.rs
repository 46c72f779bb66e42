use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use dns_resolver::config::{CliOverrides, Config};
use dns_resolver::handler::QueryHandler;
use dns_resolver::lookup::SystemLookup;
use dns_resolver::server::Server;
use dns_resolver::{Message, Name, Networkable, RecordType};
use tokio::net::UdpSocket;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dns-resolver")]
#[command(version)]
#[command(about = "DNS forwarder answering A queries from a static table or the system resolver")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the DNS server (default)
    Serve(ServeArgs),

    /// Send one A query to a server and print the answers
    Query(QueryArgs),
}

#[derive(Args, Default)]
struct ServeArgs {
    /// Configuration file path
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<String>,

    /// DNS server port
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Bind address
    #[arg(short = 'b', long)]
    bind: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Args)]
struct QueryArgs {
    /// Name to resolve
    name: String,

    /// Server to ask
    #[arg(short = 's', long, default_value = "127.0.0.1:8000")]
    server: String,

    /// Seconds to wait for the reply
    #[arg(long, default_value_t = 5)]
    timeout: u64,
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve(ServeArgs::default())) {
        Command::Serve(args) => serve(args).await,
        Command::Query(args) => query(args).await,
    }
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let overrides = CliOverrides {
        port: args.port,
        bind_address: args.bind,
        log_level: args.log_level,
    };
    let config = Config::load(args.config.as_deref(), overrides)?;

    init_logging(&config.logging.level);

    info!("Starting dns-resolver v{}", env!("CARGO_PKG_VERSION"));

    let cache = config.cache()?;
    info!("{} static records loaded", cache.len());
    for (name, addr) in cache.iter() {
        debug!("  {} -> {}", name, addr);
    }

    let handler = QueryHandler::new(Arc::new(cache), Arc::new(SystemLookup))
        .with_answer_ttl(config.resolver.answer_ttl)
        .with_lookup_timeout(config.resolver.lookup_timeout());
    let handler = Arc::new(handler);

    let server = Server::bind(config.listen_addr()?, Arc::clone(&handler))
        .await
        .context("couldn't bind DNS socket")?;

    server
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await;

    let stats = handler.stats();
    info!(
        cache_hits = stats.cache_hits,
        forwarded = stats.forwarded,
        dropped = stats.dropped,
        "server stopped"
    );

    Ok(())
}

async fn query(args: QueryArgs) -> anyhow::Result<()> {
    init_logging("warn");

    let mut name = args.name;
    if !name.ends_with('.') {
        name.push('.');
    }
    let name = Name::parse(&name).with_context(|| format!("invalid name {}", name))?;

    let request = Message::query(name, RecordType::A);

    let sock = UdpSocket::bind(("0.0.0.0", 0)).await?;
    sock.send_to(&request.to_bytes(), &args.server).await?;

    let mut buf = [0; 1232];
    let response_len = tokio::time::timeout(Duration::from_secs(args.timeout), sock.recv(&mut buf))
        .await
        .context("no reply from server")??;

    let response = Message::from_bytes(&mut Cursor::new(&buf[..response_len]))?;
    if response.header.id != request.header.id {
        anyhow::bail!("reply id {} does not match query", response.header.id);
    }

    println!("{:#?}", response.answers);

    Ok(())
}
