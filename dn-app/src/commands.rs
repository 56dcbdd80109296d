//! CLI commands and the slash-command parser for interactive chat.

use crate::assistant::CompletionClient;
use crate::chat_api::ChatApi;
use crate::config::{ApiMode, DeepNovelConfig};
use crate::novel::{NovelStore, RecordKind};
use crate::settings::{FileSettingsBackend, Settings, SettingsStore};
use anyhow::Result;
use dn_llm::ChatMessage;
use dn_tools::{GenerateImageTool, KnowledgeBase, SearchKnowledgeTool, ToolRegistry};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Reply(String),
    Exit,
}

/// Handle a `/command` line. Returns `None` for ordinary chat input.
pub fn handle_command(transcript: &mut Vec<ChatMessage>, input: &str) -> Option<CommandOutcome> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    match trimmed {
        "/exit" | "/quit" => Some(CommandOutcome::Exit),
        "/reset" | "/new" => {
            transcript.clear();
            Some(CommandOutcome::Reply("Conversation reset.".to_string()))
        }
        "/history" => Some(CommandOutcome::Reply(format!(
            "{} message(s) in this conversation",
            transcript.len()
        ))),
        _ => Some(CommandOutcome::Reply(
            "Unknown command. Supported: /reset /history /exit".to_string(),
        )),
    }
}

pub fn build_tools(knowledge: Arc<dyn KnowledgeBase>) -> Result<ToolRegistry> {
    let mut tools = ToolRegistry::new();
    tools.register(Arc::new(SearchKnowledgeTool::new(knowledge)))?;
    tools.register(Arc::new(GenerateImageTool::new()))?;
    tracing::debug!(tool_count = tools.len(), "tool registry built");
    Ok(tools)
}

pub fn build_chat_api(
    cfg: &DeepNovelConfig,
    knowledge: Arc<dyn KnowledgeBase>,
) -> Result<ChatApi> {
    let backend = FileSettingsBackend::new(cfg.storage.settings_path()?);
    let client = CompletionClient::new(cfg.api.clone(), build_tools(knowledge)?);
    Ok(ChatApi::new(SettingsStore::new(Arc::new(backend)), client))
}

async fn load_knowledge(library: Option<&Path>) -> Result<Arc<dyn KnowledgeBase>> {
    let store = match library {
        Some(path) => NovelStore::import(path).await?,
        None => NovelStore::default(),
    };
    Ok(Arc::new(store))
}

/// Run one chat turn, or an interactive loop over stdin when `message` is `None`.
#[tracing::instrument(level = "info", skip_all)]
pub async fn chat(
    cfg: &DeepNovelConfig,
    message: Option<String>,
    library: Option<PathBuf>,
) -> Result<()> {
    let knowledge = load_knowledge(library.as_deref()).await?;
    let mut api = build_chat_api(cfg, knowledge)?;
    api.load_settings().await;
    if !api.is_ready() {
        return Err(anyhow::anyhow!(
            "no API key configured; run `deepnovel settings set --api-key <KEY>`"
        ));
    }

    if let Some(message) = message {
        let response = api.send(&[ChatMessage::user(message)]).await?;
        println!("{}", response.display_text());
        return Ok(());
    }

    let mut transcript: Vec<ChatMessage> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }
        match handle_command(&mut transcript, &line) {
            Some(CommandOutcome::Exit) => break,
            Some(CommandOutcome::Reply(text)) => {
                println!("{text}");
                continue;
            }
            None => {}
        }

        transcript.push(ChatMessage::user(line.trim()));
        match api.send(&transcript).await {
            Ok(response) => {
                println!("{}", response.display_text());
                transcript.push(ChatMessage::assistant(response.message.content.clone()));
            }
            Err(e) => {
                // Drop the failed turn so the user can retry it.
                transcript.pop();
                eprintln!("error: {e}");
            }
        }
    }
    Ok(())
}

pub async fn settings_show(cfg: &DeepNovelConfig) -> Result<()> {
    let mut api = build_chat_api(cfg, Arc::new(NovelStore::default()))?;
    let settings = api.load_settings().await;
    println!("settings_path = {}", cfg.storage.settings_path()?.display());
    println!("api_key = {}", mask_key(&settings.api_key));
    println!("temperature = {}", settings.temperature);
    Ok(())
}

pub async fn settings_set(
    cfg: &DeepNovelConfig,
    api_key: Option<String>,
    temperature: Option<f64>,
) -> Result<()> {
    let mut api = build_chat_api(cfg, Arc::new(NovelStore::default()))?;
    let current = api.load_settings().await.clone();
    let next = Settings {
        api_key: api_key.map(|k| k.trim().to_string()).unwrap_or(current.api_key),
        temperature: temperature.unwrap_or(current.temperature),
    };
    api.save_settings(next).await?;
    println!(
        "settings saved (api_key = {}, temperature = {})",
        mask_key(&api.settings().api_key),
        api.settings().temperature
    );
    Ok(())
}

#[tracing::instrument(level = "info", skip_all)]
pub async fn doctor(cfg: &DeepNovelConfig) -> Result<()> {
    cfg.validate()?;
    let settings_path = cfg.storage.settings_path()?;
    let mut api = build_chat_api(cfg, Arc::new(NovelStore::default()))?;
    let settings = api.load_settings().await.clone();
    let endpoint = match cfg.api.mode {
        ApiMode::Direct => cfg.api.base_url.as_str(),
        ApiMode::Proxied => cfg.api.relay_url.as_str(),
    };
    tracing::info!(
        api_mode = ?cfg.api.mode,
        endpoint = %endpoint,
        model = %cfg.api.model,
        relay_bind_addr = %cfg.relay.bind_addr,
        settings_path = %settings_path.display(),
        has_credential = settings.has_credential(),
        temperature = settings.temperature,
        "config ok"
    );
    println!("config ok");
    println!("api mode = {:?} ({endpoint})", cfg.api.mode);
    println!("relay bind = {}", cfg.relay.bind_addr);
    println!(
        "credential = {}",
        if api.is_ready() { "configured" } else { "missing" }
    );
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, clap::Subcommand)]
pub enum LibraryAction {
    /// List ids and titles.
    List { kind: RecordKind },
    /// Print one record as JSON.
    Show { kind: RecordKind, id: String },
    /// Add a record given as a JSON object with an `id`.
    Add { kind: RecordKind, record: String },
    /// Merge the top-level fields of a JSON object into a record.
    Update {
        kind: RecordKind,
        id: String,
        patch: String,
    },
    Delete { kind: RecordKind, id: String },
}

/// Read or edit a novel library file. Edits are written back in place.
#[tracing::instrument(level = "info", skip_all, fields(library = %path.display()))]
pub async fn library(path: &Path, action: LibraryAction) -> Result<()> {
    let mut store = NovelStore::open(path).await?;
    match action {
        LibraryAction::List { kind } => {
            for (id, title) in store.summaries(kind) {
                println!("{id}\t{title}");
            }
        }
        LibraryAction::Show { kind, id } => {
            let record = store
                .find(kind, &id)
                .ok_or_else(|| anyhow::anyhow!("no {kind:?} with id {id:?}"))?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        LibraryAction::Add { kind, record } => {
            store.add(kind, parse_json_arg(&record)?)?;
            store.save(path).await?;
            println!("added");
        }
        LibraryAction::Update { kind, id, patch } => {
            if !store.update(kind, &id, parse_json_arg(&patch)?)? {
                return Err(anyhow::anyhow!("no {kind:?} with id {id:?}"));
            }
            store.save(path).await?;
            println!("updated {id}");
        }
        LibraryAction::Delete { kind, id } => {
            if !store.delete(kind, &id) {
                return Err(anyhow::anyhow!("no {kind:?} with id {id:?}"));
            }
            store.save(path).await?;
            println!("deleted {id}");
        }
    }
    Ok(())
}

fn parse_json_arg(raw: &str) -> Result<serde_json::Value> {
    serde_json::from_str(raw).map_err(|e| anyhow::anyhow!("argument is not valid JSON: {e}"))
}

fn mask_key(key: &str) -> String {
    let key = key.trim();
    if key.is_empty() {
        return "(not set)".to_string();
    }
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..3].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}…{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use uuid::Uuid;

    fn temp_config() -> (DeepNovelConfig, PathBuf) {
        let dir = std::env::temp_dir().join(format!("deepnovel-cli-{}", Uuid::new_v4()));
        let cfg = DeepNovelConfig {
            storage: StorageConfig {
                data_dir: dir.display().to_string(),
            },
            ..DeepNovelConfig::default()
        };
        (cfg, dir)
    }

    #[test]
    fn slash_commands_are_handled() {
        let mut transcript = vec![ChatMessage::user("Hi"), ChatMessage::assistant("Hello")];
        assert_eq!(handle_command(&mut transcript, "just text"), None);
        assert_eq!(
            handle_command(&mut transcript, " /history "),
            Some(CommandOutcome::Reply("2 message(s) in this conversation".to_string()))
        );
        assert_eq!(
            handle_command(&mut transcript, "/reset"),
            Some(CommandOutcome::Reply("Conversation reset.".to_string()))
        );
        assert!(transcript.is_empty());
        assert_eq!(handle_command(&mut transcript, "/exit"), Some(CommandOutcome::Exit));
        assert!(matches!(
            handle_command(&mut transcript, "/dance"),
            Some(CommandOutcome::Reply(text)) if text.starts_with("Unknown command")
        ));
    }

    #[test]
    fn masks_keys() {
        assert_eq!(mask_key(""), "(not set)");
        assert_eq!(mask_key("short"), "*****");
        assert_eq!(mask_key("sk-1234567890abcd"), "sk-…abcd");
    }

    #[test]
    fn registry_offers_both_tools() {
        let tools = build_tools(Arc::new(NovelStore::default())).expect("tools");
        let names: Vec<String> = tools.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["search_knowledge", "generate_image"]);
    }

    #[tokio::test]
    async fn settings_set_persists_and_merges() {
        let (cfg, dir) = temp_config();

        settings_set(&cfg, Some(" sk-abc ".to_string()), None)
            .await
            .expect("set key");
        settings_set(&cfg, None, Some(0.7)).await.expect("set temperature");

        let mut api = build_chat_api(&cfg, Arc::new(NovelStore::default())).expect("chat api");
        let settings = api.load_settings().await.clone();
        assert_eq!(settings.api_key, "sk-abc");
        assert_eq!(settings.temperature, 0.7);
        assert!(api.is_ready());

        let err = settings_set(&cfg, None, Some(0.0))
            .await
            .expect_err("non-positive temperature");
        assert!(err.to_string().contains("temperature"));

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn library_edits_are_written_back() {
        let path = std::env::temp_dir()
            .join(format!("deepnovel-cli-{}", Uuid::new_v4()))
            .join("library.json");

        library(
            &path,
            LibraryAction::Add {
                kind: RecordKind::Plot,
                record: r#"{"id":"p1","title":"Siege"}"#.to_string(),
            },
        )
        .await
        .expect("add");
        library(
            &path,
            LibraryAction::Update {
                kind: RecordKind::Plot,
                id: "p1".to_string(),
                patch: r#"{"title":"Siege of Venn"}"#.to_string(),
            },
        )
        .await
        .expect("update");
        let store = NovelStore::import(&path).await.expect("import");
        assert_eq!(
            store.summaries(RecordKind::Plot),
            vec![("p1".to_string(), "Siege of Venn".to_string())]
        );

        let err = library(
            &path,
            LibraryAction::Delete {
                kind: RecordKind::Plot,
                id: "p2".to_string(),
            },
        )
        .await
        .expect_err("unknown id");
        assert!(err.to_string().contains("\"p2\""));
        let err = library(
            &path,
            LibraryAction::Update {
                kind: RecordKind::Plot,
                id: "p1".to_string(),
                patch: "{not json".to_string(),
            },
        )
        .await
        .expect_err("bad patch");
        assert!(err.to_string().contains("not valid JSON"));

        library(
            &path,
            LibraryAction::Delete {
                kind: RecordKind::Plot,
                id: "p1".to_string(),
            },
        )
        .await
        .expect("delete");
        let store = NovelStore::import(&path).await.expect("import");
        assert!(store.summaries(RecordKind::Plot).is_empty());

        if let Some(dir) = path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }

    #[tokio::test]
    async fn chat_requires_credential() {
        let (cfg, dir) = temp_config();
        let err = chat(&cfg, Some("Hello".to_string()), None)
            .await
            .expect_err("no key configured");
        assert!(err.to_string().contains("settings set --api-key"));
        let _ = std::fs::remove_dir_all(dir);
    }
}
