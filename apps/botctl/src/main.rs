use std::{path::PathBuf, time::Duration};

use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use client_core::{BotClient, MessageOptions};
use serde_json::Value;
use shared::{
    domain::EntityKind,
    protocol::{BotEvent, MessageData, Params, RawFrame},
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::load_settings;

#[derive(Parser, Debug)]
#[command(name = "botctl", about = "Drive a team-messaging bot from the command line")]
struct Cli {
    #[arg(long, default_value = "bot.toml")]
    config: PathBuf,
    #[arg(long)]
    token: Option<String>,
    /// Display name attached to posted messages.
    #[arg(long)]
    name: Option<String>,
    /// Re-fetch directory collections on every lookup.
    #[arg(long)]
    no_cache: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a directory collection.
    List { kind: EntityKind },
    /// Show which id a destination name resolves to.
    Resolve {
        name: String,
        #[arg(long)]
        kind: Option<EntityKind>,
    },
    /// Send a message to a named channel, group or user.
    Send {
        name: String,
        text: String,
        #[arg(long)]
        kind: Option<EntityKind>,
        #[arg(long)]
        slackbot: bool,
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, Value)>,
    },
    /// Send a message to a destination id.
    SendId {
        id: String,
        text: String,
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, Value)>,
    },
    /// Replace the text of an existing message.
    Update { id: String, ts: String, text: String },
    /// Log in and print realtime events until interrupted.
    Listen {
        /// Reconnect once after this many seconds.
        #[arg(long)]
        reconnect_after: Option<u64>,
        /// Reconnect to this URL instead of the default target.
        #[arg(long)]
        reconnect_url: Option<String>,
    },
}

/// `key=value`. Booleans, arrays and objects are read as JSON; everything
/// else, numbers included, stays text so timestamps keep their digits.
fn parse_param(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    if key.is_empty() {
        return Err(format!("empty parameter name in '{raw}'"));
    }
    let structured = matches!(value, "true" | "false") || value.starts_with(['[', '{']);
    let value = if structured {
        serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()))
    } else {
        Value::String(value.to_string())
    };
    Ok((key.to_string(), value))
}

fn message_options(params: Vec<(String, Value)>, slackbot: bool) -> MessageOptions {
    MessageOptions {
        params: params.into_iter().collect::<Params>(),
        via_slackbot: slackbot,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let cli = Cli::parse();

    let mut settings = load_settings(&cli.config)?;
    if let Some(token) = cli.token {
        settings.token = token;
    }
    if let Some(name) = cli.name {
        settings.name = Some(name);
    }
    if cli.no_cache {
        settings.cached = false;
    }
    if settings.token.is_empty() {
        bail!("missing bot token: set `token` in the config file, BOT_TOKEN, or --token");
    }

    let client = BotClient::new(settings)?;

    match cli.command {
        Command::List { kind } => {
            for entity in client.directory().list(kind).await?.iter() {
                println!("{}\t{}", entity.id, entity.name);
            }
        }
        Command::Resolve { name, kind } => {
            let kind = match kind {
                Some(kind) => kind,
                None => client
                    .resolver()
                    .infer_kind(&name)
                    .await?
                    .ok_or_else(|| anyhow!("'{name}' matches no channel, user or group"))?,
            };
            let id = client
                .resolver()
                .id_for(kind, &name)
                .await?
                .ok_or_else(|| anyhow!("{kind} '{name}' not found"))?;
            println!("{kind}\t{id}");
        }
        Command::Send {
            name,
            text,
            kind,
            slackbot,
            params,
        } => {
            let options = message_options(params, slackbot);
            let payload = match kind {
                Some(kind) => {
                    client
                        .poster()
                        .send_to_named(kind, &name, &text, options)
                        .await?
                }
                None => client.post_to(&name, &text, options).await?,
            };
            print_sent(&payload);
        }
        Command::SendId { id, text, params } => {
            let payload = client
                .post_message(&id, &text, message_options(params, false))
                .await?;
            print_sent(&payload);
        }
        Command::Update { id, ts, text } => {
            let payload = client
                .update_message(&id, &ts, &text, MessageOptions::default())
                .await?;
            print_sent(&payload);
        }
        Command::Listen {
            reconnect_after,
            reconnect_url,
        } => listen(&client, reconnect_after, reconnect_url).await?,
    }

    Ok(())
}

fn print_sent(payload: &shared::protocol::RpcPayload) {
    let ts = payload.get("ts").and_then(Value::as_str).unwrap_or("-");
    let channel = payload.get("channel").and_then(Value::as_str).unwrap_or("-");
    println!("sent channel={channel} ts={ts}");
}

async fn listen(
    client: &BotClient,
    reconnect_after: Option<u64>,
    reconnect_url: Option<String>,
) -> Result<()> {
    let mut events = client.subscribe_events();
    client.login().await?;
    if let Some(session) = client.connection().session().await {
        if let Some(identity) = session.self_identity {
            info!(user = %identity.name, id = %identity.id, "botctl: logged in");
        }
    }

    let reconnect_timer = tokio::time::sleep(Duration::from_secs(reconnect_after.unwrap_or(0)));
    tokio::pin!(reconnect_timer);
    let mut reconnect_pending = reconnect_after.is_some();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = &mut reconnect_timer, if reconnect_pending => {
                reconnect_pending = false;
                if let Err(err) = client.reconnect(reconnect_url.as_deref()).await {
                    warn!(error = %err, "botctl: reconnect failed");
                }
            }
            event = events.recv() => match event {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "botctl: event consumer lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    client.logout().await;
    Ok(())
}

fn print_event(event: &BotEvent) {
    match event {
        BotEvent::SocketMessage { data, .. } => match data {
            MessageData::Json(value) => println!("{} {value}", event.name()),
            MessageData::Opaque(RawFrame::Text(text)) => {
                println!("{} (opaque) {text}", event.name())
            }
            MessageData::Opaque(RawFrame::Binary(bytes)) => {
                println!("{} (opaque) {} bytes", event.name(), bytes.len())
            }
        },
        BotEvent::SocketClose { code, message } => {
            println!("{} code={code} message={message}", event.name())
        }
        BotEvent::SocketError { error } => println!("{} {error}", event.name()),
        other => println!("{}", other.name()),
    }
}
