//! DeepNovel main binary: chat relay server and command-line chat client.

mod assistant;
mod chat_api;
mod commands;
mod config;
mod novel;
mod routes;
mod server;
mod settings;
mod structured;
#[cfg(test)]
mod test_support;

use clap::{Parser, Subcommand};
use config::DeepNovelConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Debug, Parser)]
#[command(
    name = "deepnovel",
    version,
    about = "DeepNovel chat relay and writing assistant"
)]
struct Cli {
    /// Config file (default: ~/.deepnovel/config.toml).
    #[arg(long, global = true, env = "DEEPNOVEL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the chat relay server (default).
    Serve,
    /// Chat with the assistant; interactive when no message is given.
    Chat {
        message: Option<String>,
        /// Novel library JSON searched by the knowledge tool.
        #[arg(long)]
        library: Option<PathBuf>,
    },
    /// Show or change the stored chat settings.
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Browse or edit a novel library file.
    Library {
        /// Library JSON file; created on the first edit.
        #[arg(long)]
        file: PathBuf,
        #[command(subcommand)]
        action: commands::LibraryAction,
    },
    /// Validate config and report the settings state.
    Doctor,
}

#[derive(Debug, Subcommand)]
enum SettingsAction {
    Show,
    Set {
        #[arg(long)]
        api_key: Option<String>,
        #[arg(long)]
        temperature: Option<f64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing()?;
    install_panic_hook();

    let cli = Cli::parse();
    let cfg = DeepNovelConfig::load(cli.config).await?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => server::serve(cfg).await,
        Command::Chat { message, library } => commands::chat(&cfg, message, library).await,
        Command::Settings { action } => match action {
            SettingsAction::Show => commands::settings_show(&cfg).await,
            SettingsAction::Set {
                api_key,
                temperature,
            } => commands::settings_set(&cfg, api_key, temperature).await,
        },
        Command::Library { file, action } => commands::library(&file, action).await,
        Command::Doctor => commands::doctor(&cfg).await,
    }
}

fn init_tracing() -> anyhow::Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(v) => v,
        Err(_) => EnvFilter::new(
            "info,deepnovel=debug,dn_llm=debug,dn_tools=debug,tower_http=info",
        ),
    };
    let log_format = std::env::var("DEEPNOVEL_LOG_FORMAT")
        .unwrap_or_else(|_| "json".to_string())
        .to_ascii_lowercase();

    // Logs go to stderr; stdout carries chat replies.
    match log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .with_span_list(true)
                .init();
        }
        "pretty" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .pretty()
                .init();
        }
        "compact" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(true)
                .compact()
                .init();
        }
        other => {
            return Err(anyhow::anyhow!(
                "unsupported DEEPNOVEL_LOG_FORMAT={other:?}; expected one of: json, pretty, compact"
            ));
        }
    }

    tracing::info!(
        log_format = %log_format,
        env_filter = ?std::env::var("RUST_LOG").ok(),
        "tracing initialized"
    );
    Ok(())
}

fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        let payload = panic_payload_to_string(panic_info.payload());
        tracing::error!(
            panic_location = %location,
            panic_payload = %payload,
            "panic captured"
        );
        default_hook(panic_info);
    }));
}

fn panic_payload_to_string(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        return msg.to_string();
    }
    if let Some(msg) = payload.downcast_ref::<String>() {
        return msg.clone();
    }
    "non-string panic payload".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_to_serve() {
        let cli = Cli::try_parse_from(["deepnovel"]).expect("parse");
        assert!(cli.command.is_none());
    }

    #[test]
    fn cli_parses_settings_set() {
        let cli = Cli::try_parse_from([
            "deepnovel",
            "settings",
            "set",
            "--api-key",
            "sk-1",
            "--temperature",
            "0.9",
            "--config",
            "/tmp/deepnovel.toml",
        ])
        .expect("parse");
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/deepnovel.toml")));
        match cli.command {
            Some(Command::Settings {
                action:
                    SettingsAction::Set {
                        api_key,
                        temperature,
                    },
            }) => {
                assert_eq!(api_key.as_deref(), Some("sk-1"));
                assert_eq!(temperature, Some(0.9));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn cli_parses_library_update() {
        let cli = Cli::try_parse_from([
            "deepnovel",
            "library",
            "--file",
            "lib.json",
            "update",
            "world",
            "w1",
            r#"{"magic":"none"}"#,
        ])
        .expect("parse");
        match cli.command {
            Some(Command::Library { file, action }) => {
                assert_eq!(file, PathBuf::from("lib.json"));
                assert_eq!(
                    action,
                    commands::LibraryAction::Update {
                        kind: novel::RecordKind::World,
                        id: "w1".to_string(),
                        patch: r#"{"magic":"none"}"#.to_string(),
                    }
                );
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn panic_payload_strings_are_extracted() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_payload_to_string(payload.as_ref()), "boom");
        let payload: Box<dyn std::any::Any + Send> = Box::new(7u8);
        assert_eq!(panic_payload_to_string(payload.as_ref()), "non-string panic payload");
    }
}
