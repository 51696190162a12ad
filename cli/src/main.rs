//! electrumrpc CLI — query an Electrum server from the terminal.
//!
//! Usage:
//! ```bash
//! # Check the server answers
//! electrumrpc ping --addr electrum.example.org:50001
//!
//! # Fee estimates for a few confirmation targets
//! electrumrpc fees --targets 1,2,6,144
//!
//! # History of one or more script hashes, with debug logs
//! electrumrpc history --scripthash 8b01df4e... --log-level debug
//!
//! # Trace the wire traffic only
//! electrumrpc tip --log electrumrpc-line=trace
//! ```

mod logging;

use std::collections::BTreeMap;
use std::env;
use std::process;
use std::sync::Arc;

use anyhow::{bail, Context};
use electrumrpc_client::{ElectrumRpc, ElectrumRpcConfig};
use electrumrpc_line::{LineTransport, LineTransportConfig};
use serde::Serialize;
use tokio::net::TcpStream;

use logging::{init_tracing, LogConfig};

const DEFAULT_ADDR: &str = "127.0.0.1:50001";
const DEFAULT_TARGETS: &[u32] = &[1, 2, 3, 6, 12, 25, 144];

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let command = args[1].as_str();
    let flags = &args[2..];
    match command {
        "--version" | "-V" => {
            println!("electrumrpc {}", env!("CARGO_PKG_VERSION"));
            return;
        }
        "help" | "--help" | "-h" => {
            print_usage();
            return;
        }
        _ => {}
    }

    let log_config = match log_config(flags) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e:#}");
            process::exit(1);
        }
    };
    init_tracing(&log_config);

    if let Err(e) = run(command, flags).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(command: &str, flags: &[String]) -> anyhow::Result<()> {
    let known = ["ping", "version", "banner", "tip", "relayfee", "fees", "histogram", "history"];
    if !known.contains(&command) {
        print_usage();
        bail!("unknown command: {command}");
    }

    let rpc = connect(flags).await?;
    match command {
        "ping" => {
            let start = std::time::Instant::now();
            rpc.ping().await?;
            println!("pong in {}ms", start.elapsed().as_millis());
        }
        "version" => print_json(&rpc.server_version().await?)?,
        "banner" => println!("{}", rpc.server_banner().await?),
        "tip" => print_json(&rpc.subscribe_block_headers().await?)?,
        "relayfee" => println!("{}", rpc.minimum_relay_fee().await?),
        "fees" => {
            let targets = match parse_flag(flags, "--targets") {
                Some(list) => parse_targets(&list)?,
                None => DEFAULT_TARGETS.to_vec(),
            };
            print_json(&rpc.fee_estimates(&targets).await?)?;
        }
        "histogram" => {
            let histogram: Vec<(f64, u64)> = rpc.fee_rate_histogram().await?.iter().collect();
            print_json(&histogram)?;
        }
        "history" => {
            let hashes = parse_all(flags, "--scripthash");
            if hashes.is_empty() {
                bail!("--scripthash is required");
            }
            let keyed: BTreeMap<String, String> =
                hashes.into_iter().map(|h| (h.clone(), h)).collect();
            print_json(&rpc.script_hash_history("cli", &keyed, true).await?)?;
        }
        other => bail!("unknown command: {other}"),
    }

    tracing::debug!(last_id = rpc.id_counter_value(), "done");
    Ok(())
}

async fn connect(flags: &[String]) -> anyhow::Result<ElectrumRpc> {
    let addr = parse_flag(flags, "--addr").unwrap_or_else(|| DEFAULT_ADDR.into());
    let stream = TcpStream::connect(&addr)
        .await
        .with_context(|| format!("connecting to {addr}"))?;
    tracing::info!(%addr, "connected");

    let transport = LineTransport::new(addr, stream, LineTransportConfig::default());
    Ok(ElectrumRpc::new(Arc::new(transport), 0, ElectrumRpcConfig::default()))
}

fn print_usage() {
    println!("electrumrpc {}", env!("CARGO_PKG_VERSION"));
    println!("Query an Electrum server over plain TCP\n");
    println!("USAGE:");
    println!("    electrumrpc <COMMAND> [FLAGS]\n");
    println!("COMMANDS:");
    println!("    ping        Round-trip server.ping");
    println!("    version     Negotiate protocol version");
    println!("    banner      Print the server banner");
    println!("    tip         Subscribe to headers and print the tip");
    println!("    relayfee    Minimum relay fee");
    println!("    fees        Fee estimates      [--targets 1,2,6]");
    println!("    histogram   Mempool fee histogram");
    println!("    history     Script hash history [--scripthash <HASH>]...");
    println!("    help        Print this help\n");
    println!("FLAGS:");
    println!("    --addr <HOST:PORT>   Server address  [default: {DEFAULT_ADDR}]");
    println!("    --log-level <LEVEL>  trace|debug|info|warn|error  (RUST_LOG overrides)");
    println!("    --log <CRATE=LEVEL>  Per-crate level, repeatable  e.g. electrumrpc-line=trace");
    println!("    --json-logs          Structured JSON logs on stderr");
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn log_config(flags: &[String]) -> anyhow::Result<LogConfig> {
    let mut components = BTreeMap::new();
    for directive in parse_all(flags, "--log") {
        match directive.split_once('=') {
            Some((component, level)) if !component.is_empty() && !level.is_empty() => {
                components.insert(component.to_string(), level.to_string());
            }
            _ => bail!("invalid --log directive, expected <crate>=<level>: {directive}"),
        }
    }
    Ok(LogConfig {
        level: parse_flag(flags, "--log-level").unwrap_or_else(|| "warn".into()),
        components,
        json: flags.iter().any(|a| a == "--json-logs"),
    })
}

fn parse_targets(list: &str) -> anyhow::Result<Vec<u32>> {
    list.split(',')
        .map(|t| {
            t.trim()
                .parse()
                .with_context(|| format!("invalid target block count: {t}"))
        })
        .collect()
}

fn parse_flag(args: &[String], flag: &str) -> Option<String> {
    let pos = args.iter().position(|a| a == flag)?;
    args.get(pos + 1).cloned()
}

/// Every value given for a repeatable flag.
fn parse_all(args: &[String], flag: &str) -> Vec<String> {
    args.windows(2)
        .filter(|pair| pair[0] == flag)
        .map(|pair| pair[1].clone())
        .collect()
}
