//! wsbus CLI: subscribe to topics and probe pub/sub endpoints from the terminal.
//!
//! Usage:
//! ```bash
//! # Stream deliveries for one or more topics
//! wsbus listen --url wss://feed.example.com/ws --topic prices --topic trades
//!
//! # Send a correlated request and print the response
//! wsbus request --url wss://feed.example.com/ws --data '{"op":"status"}'
//!
//! # Connect, wait for one heartbeat round trip, report
//! wsbus ping --url wss://feed.example.com/ws
//! ```
//!
//! Every command also accepts `--config <FILE>` (JSON client config);
//! `--url` overrides the file's endpoint. Log level via `RUST_LOG`.

use std::env;
use std::process;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context};
use tracing_subscriber::EnvFilter;

use wsbus_core::ClientConfig;
use wsbus_ws::{ClientEvent, PubSubClient};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let result = match args[1].as_str() {
        "listen" => cmd_listen(&args[2..]).await,
        "request" => cmd_request(&args[2..]).await,
        "ping" => cmd_ping(&args[2..]).await,
        "version" | "--version" | "-V" => {
            println!("wsbus {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_usage();
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn print_usage() {
    println!("wsbus {}", env!("CARGO_PKG_VERSION"));
    println!("Resilient pub/sub client\n");
    println!("USAGE:");
    println!("    wsbus <COMMAND> [FLAGS]\n");
    println!("COMMANDS:");
    println!("    listen     Subscribe to topics and print deliveries");
    println!("    request    Send a correlated request and print the response");
    println!("    ping       Measure one heartbeat round trip");
    println!("    version    Print version");
    println!("    help       Print this help\n");
    println!("FLAGS:");
    println!("    --url <URL>        Endpoint URL (required unless in --config)");
    println!("    --config <FILE>    JSON client config");
    println!("    --topic <TOPIC>    Topic to subscribe to (listen, repeatable)");
    println!("    --data <JSON>      Request payload (request)");
}

async fn cmd_listen(args: &[String]) -> anyhow::Result<()> {
    let topics = parse_flags(args, "--topic");
    if topics.is_empty() {
        bail!("at least one --topic is required");
    }
    let client = PubSubClient::new(load_config(args)?);

    for topic in topics {
        let label = topic.clone();
        client.subscribe(topic, move |payload| {
            println!("[{label}] {payload}");
        })?;
    }

    let mut events = client.events();
    client.connect().await?;
    eprintln!("Connected to {} (Ctrl-C to stop)", client.url());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            ev = events.recv() => match ev {
                Ok(ClientEvent::Disconnected { reason }) => eprintln!("disconnected: {reason}"),
                Ok(ClientEvent::Connected) => eprintln!("reconnected, subscriptions replayed"),
                Ok(ClientEvent::Error(msg)) => eprintln!("server error: {}", msg.data),
                Ok(ClientEvent::MaxReconnectsExceeded { attempts }) => {
                    bail!("gave up after {attempts} reconnect attempts");
                }
                Ok(_) => {}
                Err(_) => break,
            },
        }
    }

    client.close().await;
    Ok(())
}

async fn cmd_request(args: &[String]) -> anyhow::Result<()> {
    let data = parse_flag(args, "--data").ok_or_else(|| anyhow!("--data is required"))?;
    let data: serde_json::Value = serde_json::from_str(&data).context("--data is not valid JSON")?;

    let client = PubSubClient::new(load_config(args)?);
    client.connect().await?;
    let result = client.request(data).await;
    client.close().await;

    println!("{}", serde_json::to_string_pretty(&result?).unwrap_or_default());
    Ok(())
}

async fn cmd_ping(args: &[String]) -> anyhow::Result<()> {
    let mut config = load_config(args)?;
    config.ping_interval_ms = 100;
    config.reconnect_on_missed_pong = false;
    let client = PubSubClient::new(config);
    let mut events = client.events();

    let start = Instant::now();
    client.connect().await?;
    let connect_latency = start.elapsed();

    let pong = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match events.recv().await {
                Ok(ClientEvent::Pong { id }) => return Ok(id),
                Ok(_) => {}
                Err(e) => return Err(anyhow!("event stream ended: {e}")),
            }
        }
    })
    .await
    .context("no pong within 10s")??;
    let round_trip = start.elapsed() - connect_latency;

    println!("  URL:        {}", client.url());
    println!("  Status:     {}", client.status());
    println!("  Connect:    {}ms", connect_latency.as_millis());
    println!("  First pong: {}ms after connect ({pong})", round_trip.as_millis());

    client.close().await;
    Ok(())
}

fn load_config(args: &[String]) -> anyhow::Result<ClientConfig> {
    let mut config = match parse_flag(args, "--config") {
        Some(path) => {
            let text = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
            ClientConfig::from_json_str(&text).with_context(|| format!("parsing {path}"))?
        }
        None => {
            let url = parse_flag(args, "--url").ok_or_else(|| anyhow!("--url is required"))?;
            ClientConfig::new(url)
        }
    };
    if let Some(url) = parse_flag(args, "--url") {
        config.url = url;
    }
    Ok(config)
}

fn parse_flag(args: &[String], flag: &str) -> Option<String> {
    let pos = args.iter().position(|a| a == flag)?;
    args.get(pos + 1).cloned()
}

fn parse_flags(args: &[String], flag: &str) -> Vec<String> {
    args.windows(2)
        .filter(|w| w[0] == flag)
        .map(|w| w[1].clone())
        .collect()
}
