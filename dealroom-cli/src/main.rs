//! dealroom: command-line driver for the dealroom sync client.
//!
//! Connects to the push channel and REST API the same way the app does and
//! prints what it sees. Commands:
//!
//!   dealroom watch [--seconds N]            Log every push event
//!   dealroom status                         Connect and print the connection state
//!   dealroom report <txn> [--set k=v]       Fetch a transaction report, optionally edit a field
//!   dealroom notifications [--mark-all-read]
//!   dealroom settings [--push on|off] [--theme NAME]
//!   dealroom chat <message> [--conversation ID]
//!
//! Settings come from `~/.config/dealroom/cli.toml`, `DEALROOM_*` variables
//! and flags, in increasing priority.

mod config;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use dealroom_sdk::event::names;
use dealroom_sdk::models::{DisplayPreferencesPatch, NotificationPreferencesPatch};
use dealroom_sdk::{ServerEvent, StaticSession, SyncConfig, SyncService, handler};
use serde::Serialize;
use serde_json::Value;

use crate::config::Config;

#[derive(Parser)]
#[command(name = "dealroom", about = "Drive the dealroom sync client from a terminal")]
struct Args {
    /// Push-channel WebSocket URL
    #[arg(long, env = "DEALROOM_SOCKET_URL")]
    socket_url: Option<String>,

    /// REST API base URL
    #[arg(long, env = "DEALROOM_API_URL")]
    api_url: Option<String>,

    /// Bearer token (or set DEALROOM_TOKEN)
    #[arg(long, env = "DEALROOM_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Cookie header to send when no token is given
    #[arg(long)]
    cookie: Option<String>,

    /// Demo mode: never open the push channel
    #[arg(long, env = "DEALROOM_DEMO_MODE")]
    demo: bool,

    /// Write the effective connection flags to the config file
    #[arg(long)]
    save_config: bool,

    /// Log as JSON lines
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Connect and log every push event
    Watch {
        /// Stop after this many seconds (default: until Ctrl-C)
        #[arg(long)]
        seconds: Option<u64>,
    },
    /// Connect and print the connection state
    Status,
    /// Fetch a transaction report
    Report {
        transaction_id: String,
        /// Set one extracted field, as `field=value` (value parsed as JSON when possible)
        #[arg(long, value_parser = parse_field)]
        set: Option<(String, Value)>,
    },
    /// List notifications
    Notifications {
        #[arg(long)]
        mark_all_read: bool,
    },
    /// Show or change user settings
    Settings {
        /// Push notifications on/off
        #[arg(long, value_parser = parse_switch)]
        push: Option<bool>,
        /// Display theme
        #[arg(long)]
        theme: Option<String>,
    },
    /// Send a message to the assistant and wait for the reply
    Chat {
        message: String,
        #[arg(long)]
        conversation: Option<String>,
        /// Seconds to wait for the reply
        #[arg(long, default_value_t = 30)]
        wait: u64,
    },
}

fn parse_field(s: &str) -> Result<(String, Value), String> {
    let (field, raw) = s
        .split_once('=')
        .ok_or_else(|| format!("expected field=value, got {s:?}"))?;
    if field.is_empty() {
        return Err("field name is empty".into());
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((field.to_string(), value))
}

fn parse_switch(s: &str) -> Result<bool, String> {
    match s.to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Ok(true),
        "off" | "false" | "no" | "0" => Ok(false),
        _ => Err(format!("expected on or off, got {s:?}")),
    }
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "dealroom_cli=info,dealroom_sdk=info".into());
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_json);

    let mut file_config = Config::load();
    let flags = Config {
        socket_url: args.socket_url.clone(),
        api_url: args.api_url.clone(),
        demo_mode: args.demo.then_some(true),
        cookie: args.cookie.clone(),
        ..Default::default()
    };
    file_config.merge(&flags);
    if args.save_config {
        let path = file_config.save().context("saving config")?;
        tracing::info!(path = %path.display(), "Config saved");
    }

    let mut sync = SyncConfig::from_env();
    file_config.apply(&mut sync);
    tracing::info!(
        socket = %sync.socket_url,
        api = %sync.api_url,
        demo = sync.demo_mode,
        "Starting dealroom"
    );

    let session = Arc::new(StaticSession::new(args.token.clone()));
    let service = SyncService::connect_to(sync, session).context("building sync service")?;

    let outcome = run(&service, args.command).await;
    service.dispose();
    outcome
}

async fn run(service: &SyncService, command: Command) -> Result<()> {
    match command {
        Command::Watch { seconds } => watch(service, seconds).await,
        Command::Status => {
            if let Err(e) = service.init().await {
                tracing::error!(error = %e, "Connect failed");
            }
            let state = service.connection_state();
            println!("connected:   {}", state.is_connected);
            println!("socket id:   {}", state.socket_id.as_deref().unwrap_or("-"));
            println!("error:       {}", state.error.as_deref().unwrap_or("-"));
            println!("attempts:    {}", state.reconnect_attempts);
            Ok(())
        }
        Command::Report {
            transaction_id,
            set,
        } => {
            let reports = service.reports();
            let Some(report) = reports.fetch_transaction_report(&transaction_id).await else {
                match reports.error() {
                    Some(e) => bail!("fetching report for {transaction_id}: {e}"),
                    None => {
                        println!("No report for {transaction_id}");
                        return Ok(());
                    }
                }
            };
            match set {
                None => print_json(&*report),
                Some((field, value)) => {
                    let updated = reports
                        .update_report_field(&transaction_id, &field, value)
                        .await
                        .with_context(|| format!("updating {field} on {transaction_id}"))?;
                    match updated {
                        Some(report) => print_json(&report),
                        None => bail!("report for {transaction_id} disappeared before the edit"),
                    }
                }
            }
        }
        Command::Notifications { mark_all_read } => {
            let notifications = service.notifications();
            let items = notifications.fetch_notifications().await;
            if let Some(e) = notifications.error() {
                bail!("fetching notifications: {e}");
            }
            if mark_all_read {
                notifications
                    .mark_all_read()
                    .await
                    .context("marking notifications read")?;
            }
            for n in if mark_all_read { notifications.notifications() } else { items } {
                let marker = if n.read { " " } else { "*" };
                println!("{marker} {}  {}", n.created_at.format("%Y-%m-%d %H:%M"), n.title);
            }
            println!("{} unread", notifications.unread_count());
            Ok(())
        }
        Command::Settings { push, theme } => {
            let settings = service.settings();
            settings.load().await.context("loading settings")?;
            if let Some(push) = push {
                settings
                    .update_notification_preferences(NotificationPreferencesPatch {
                        push_enabled: Some(push),
                        ..Default::default()
                    })
                    .await
                    .context("updating notification preferences")?;
            }
            if theme.is_some() {
                settings
                    .update_display_preferences(DisplayPreferencesPatch {
                        theme,
                        ..Default::default()
                    })
                    .await
                    .context("updating display preferences")?;
            }
            match settings.settings() {
                Some(current) => print_json(&current),
                None => bail!("settings not loaded"),
            }
        }
        Command::Chat {
            message,
            conversation,
            wait,
        } => chat(service, message, conversation, wait).await,
    }
}

async fn watch(service: &SyncService, seconds: Option<u64>) -> Result<()> {
    let log_event = handler(|event: &ServerEvent| {
        tracing::info!(event = event.name(), payload = ?event, "Push event");
    });
    for name in names::SERVER_EVENTS {
        service.connection().on(name, &log_event);
    }

    service.init().await.context("connecting to push channel")?;
    let mut state = service.connection().watch_state();
    let deadline = async {
        match seconds {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let s = state.borrow_and_update().clone();
                tracing::info!(
                    connected = s.is_connected,
                    connecting = s.is_connecting,
                    error = ?s.error,
                    "Connection state"
                );
                if !s.is_connected && !s.is_connecting {
                    bail!("push channel closed: {}", s.error.unwrap_or_default());
                }
            }
        }
    }
    Ok(())
}

async fn chat(
    service: &SyncService,
    message: String,
    conversation: Option<String>,
    wait: u64,
) -> Result<()> {
    service.init().await.context("connecting to push channel")?;
    let chat = service.chat();
    let Some(local_id) = chat.send_message(&message, conversation, None).await? else {
        bail!("message is empty");
    };
    tracing::debug!(%local_id, "Message sent");

    let replied = tokio::time::timeout(Duration::from_secs(wait), async {
        loop {
            if chat.messages().iter().any(|m| m.role == "assistant") {
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    })
    .await;
    if replied.is_err() {
        bail!("no reply within {wait}s");
    }
    for m in chat.messages() {
        println!("{:>9}: {}", m.role, m.content);
    }
    Ok(())
}
