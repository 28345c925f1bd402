//! Interactive terminal client for the pingmux server.

mod commands;
mod tls;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::Connector;

use commands::Command;

#[derive(Parser)]
#[command(name = "pingmux-cli", version, about = "Interactive pingmux client")]
struct Args {
    /// Server WebSocket URL.
    #[arg(short, long, default_value = "ws://127.0.0.1:5555/ws")]
    server: String,

    /// CA certificate for verifying the server (enables TLS).
    #[arg(long)]
    ca: Option<PathBuf>,

    /// Client certificate presented to the server.
    #[arg(long)]
    cert: Option<PathBuf>,

    /// Client private key.
    #[arg(long)]
    key: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let connector = match (&args.ca, &args.cert, &args.key) {
        (Some(ca), Some(cert), Some(key)) => {
            Some(Connector::Rustls(tls::build_client_config(ca, cert, key)?))
        }
        (None, None, None) => None,
        _ => bail!("--ca, --cert and --key must be given together"),
    };

    let (ws, _) = match connector {
        Some(connector) => tokio_tungstenite::connect_async_tls_with_config(
            args.server.as_str(),
            None,
            false,
            Some(connector),
        )
        .await
        .with_context(|| format!("cannot connect to {}", args.server))?,
        None => tokio_tungstenite::connect_async(args.server.as_str())
            .await
            .with_context(|| format!("cannot connect to {}", args.server))?,
    };

    println!("connected to {} (try `help`)", args.server);
    let (mut sink, mut stream) = ws.split();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut next_id: u64 = 1;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("reading stdin")? else {
                    break;
                };
                match commands::parse(&line) {
                    Ok(None) => {}
                    Ok(Some(Command::Quit)) => break,
                    Ok(Some(Command::Help)) => println!("{}", commands::HELP),
                    Ok(Some(command)) => {
                        if let Some(frame) = command.frame(next_id) {
                            next_id += 1;
                            sink.send(Message::Text(frame.to_string().into()))
                                .await
                                .context("sending request")?;
                        }
                    }
                    Err(error) => eprintln!("{error}"),
                }
            }
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<serde_json::Value>(&text) {
                            Ok(value) => println!("{}", commands::render(&value)),
                            Err(_) => println!("{text}"),
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        sink.send(Message::Pong(payload)).await.ok();
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        eprintln!("server closed the connection");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        eprintln!("connection error: {error}");
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}
