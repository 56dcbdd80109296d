//! Story entities kept in memory: characters, worlds, plots and scenes.
//!
//! The collections double as the knowledge base behind `search_knowledge`.

use dn_tools::{KnowledgeBase, KnowledgeHit};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

const EXCERPT_CHARS: usize = 160;

#[derive(Debug, Error)]
pub enum NovelError {
    #[error("{kind} with id {id:?} already exists")]
    DuplicateId { kind: &'static str, id: String },

    #[error("invalid {kind} patch: {reason}")]
    InvalidPatch { kind: &'static str, reason: String },

    #[error("invalid {kind} record: {reason}")]
    InvalidRecord { kind: &'static str, reason: String },
}

/// Which collection of a [`NovelStore`] a command targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum RecordKind {
    Character,
    World,
    Plot,
    Scene,
}

pub trait Record: Clone + Serialize + DeserializeOwned {
    const KIND: &'static str;

    fn id(&self) -> &str;
    fn title(&self) -> String;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Character {
    pub id: String,
    pub basic_info: String,
    pub personality: String,
    pub appearance: String,
    pub background: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct World {
    pub id: String,
    pub name: String,
    pub description: String,
    pub geography: String,
    pub civilization: String,
    pub magic: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Plot {
    pub id: String,
    pub title: String,
    pub acts: Vec<Act>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Act {
    pub title: String,
    pub scenes: Vec<Beat>,
}

/// One scene outline inside a plot act.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Beat {
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elements: Option<BeatElements>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeatElements {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub characters: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scene {
    pub id: String,
    pub content: String,
    pub analysis: SceneAnalysis,
    pub suggestions: Vec<Suggestion>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneAnalysis {
    pub emotion: String,
    pub imagery: String,
    pub interaction: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionKind {
    Primary,
    Success,
    Warning,
    Danger,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    #[serde(rename = "type")]
    pub kind: SuggestionKind,
    pub content: String,
}

impl Record for Character {
    const KIND: &'static str = "character";

    fn id(&self) -> &str {
        &self.id
    }

    fn title(&self) -> String {
        first_line(&self.basic_info)
    }
}

impl Record for World {
    const KIND: &'static str = "world";

    fn id(&self) -> &str {
        &self.id
    }

    fn title(&self) -> String {
        self.name.clone()
    }
}

impl Record for Plot {
    const KIND: &'static str = "plot";

    fn id(&self) -> &str {
        &self.id
    }

    fn title(&self) -> String {
        self.title.clone()
    }
}

impl Record for Scene {
    const KIND: &'static str = "scene";

    fn id(&self) -> &str {
        &self.id
    }

    fn title(&self) -> String {
        first_line(&self.content)
    }
}

fn first_line(s: &str) -> String {
    truncate_chars(s.lines().next().unwrap_or_default().trim(), 60)
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}

/// Flat list of records with unique ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Collection<T> {
    items: Vec<T>,
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: Record> Collection<T> {
    pub fn add(&mut self, item: T) -> Result<(), NovelError> {
        if self.find(item.id()).is_some() {
            return Err(NovelError::DuplicateId {
                kind: T::KIND,
                id: item.id().to_string(),
            });
        }
        self.items.push(item);
        Ok(())
    }

    /// Shallow-merge the top-level fields of `patch` into the record with
    /// `id`. The id itself never changes. Returns whether a record matched.
    pub fn update(&mut self, id: &str, patch: serde_json::Value) -> Result<bool, NovelError> {
        let Some(index) = self.items.iter().position(|r| r.id() == id) else {
            return Ok(false);
        };
        let invalid = |reason: String| NovelError::InvalidPatch {
            kind: T::KIND,
            reason,
        };
        let serde_json::Value::Object(patch) = patch else {
            return Err(invalid("patch must be a JSON object".to_string()));
        };

        let mut merged =
            serde_json::to_value(&self.items[index]).map_err(|e| invalid(e.to_string()))?;
        if let serde_json::Value::Object(fields) = &mut merged {
            for (key, value) in patch {
                if key == "id" {
                    continue;
                }
                fields.insert(key, value);
            }
        }
        self.items[index] =
            serde_json::from_value(merged).map_err(|e| invalid(e.to_string()))?;
        Ok(true)
    }

    pub fn delete(&mut self, id: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|r| r.id() != id);
        self.items.len() != before
    }

    pub fn find(&self, id: &str) -> Option<&T> {
        self.items.iter().find(|r| r.id() == id)
    }

    pub fn list(&self) -> &[T] {
        &self.items
    }

    fn add_json(&mut self, record: serde_json::Value) -> Result<(), NovelError> {
        let record: T = serde_json::from_value(record).map_err(|e| NovelError::InvalidRecord {
            kind: T::KIND,
            reason: e.to_string(),
        })?;
        if record.id().trim().is_empty() {
            return Err(NovelError::InvalidRecord {
                kind: T::KIND,
                reason: "id is required".to_string(),
            });
        }
        self.add(record)
    }

    fn find_json(&self, id: &str) -> Option<serde_json::Value> {
        self.find(id).and_then(|r| serde_json::to_value(r).ok())
    }

    fn summaries(&self) -> Vec<(String, String)> {
        self.items
            .iter()
            .map(|r| (r.id().to_string(), r.title()))
            .collect()
    }

    fn search_into(&self, terms: &[String], hits: &mut Vec<(usize, KnowledgeHit)>) {
        for record in &self.items {
            let Ok(value) = serde_json::to_value(record) else {
                continue;
            };
            let mut texts = Vec::new();
            collect_strings(&value, &mut texts);

            let lowered: Vec<String> = texts.iter().map(|t| t.to_lowercase()).collect();
            let mut score = 0;
            let mut all_present = true;
            for term in terms {
                let n: usize = lowered.iter().map(|t| t.matches(term.as_str()).count()).sum();
                if n == 0 {
                    all_present = false;
                    break;
                }
                score += n;
            }
            if !all_present {
                continue;
            }

            let excerpt = texts
                .iter()
                .zip(&lowered)
                .find(|(_, l)| l.contains(terms[0].as_str()))
                .map(|(t, _)| truncate_chars(t.trim(), EXCERPT_CHARS))
                .unwrap_or_default();
            hits.push((
                score,
                KnowledgeHit {
                    source: T::KIND.to_string(),
                    id: record.id().to_string(),
                    title: record.title(),
                    excerpt,
                },
            ));
        }
    }
}

/// Every string value in `value` except object `id` fields.
fn collect_strings(value: &serde_json::Value, out: &mut Vec<String>) {
    match value {
        serde_json::Value::String(s) if !s.trim().is_empty() => out.push(s.clone()),
        serde_json::Value::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
        serde_json::Value::Object(map) => map
            .iter()
            .filter(|(k, _)| k.as_str() != "id")
            .for_each(|(_, v)| collect_strings(v, out)),
        _ => {}
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NovelStore {
    pub characters: Collection<Character>,
    pub worlds: Collection<World>,
    pub plots: Collection<Plot>,
    pub scenes: Collection<Scene>,
}

impl NovelStore {
    /// Load a library file shaped like the store. Duplicate ids are rejected.
    pub async fn import(path: &Path) -> anyhow::Result<Self> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| anyhow::anyhow!("read library {}: {e}", path.display()))?;
        let raw: NovelStore = serde_json::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("parse library {}: {e}", path.display()))?;

        let mut store = NovelStore::default();
        for c in raw.characters.items {
            store.characters.add(c)?;
        }
        for w in raw.worlds.items {
            store.worlds.add(w)?;
        }
        for p in raw.plots.items {
            store.plots.add(p)?;
        }
        for s in raw.scenes.items {
            store.scenes.add(s)?;
        }
        tracing::info!(
            library = %path.display(),
            characters = store.characters.list().len(),
            worlds = store.worlds.list().len(),
            plots = store.plots.list().len(),
            scenes = store.scenes.list().len(),
            "novel library imported"
        );
        Ok(store)
    }

    /// Like [`NovelStore::import`], but a missing file is an empty library.
    pub async fn open(path: &Path) -> anyhow::Result<Self> {
        match tokio::fs::try_exists(path).await {
            Ok(true) => Self::import(path).await,
            Ok(false) => Ok(Self::default()),
            Err(e) => Err(anyhow::anyhow!("stat library {}: {e}", path.display())),
        }
    }

    pub async fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content)
            .await
            .map_err(|e| anyhow::anyhow!("write library {}: {e}", path.display()))?;
        tracing::info!(library = %path.display(), "novel library saved");
        Ok(())
    }

    pub fn add(&mut self, kind: RecordKind, record: serde_json::Value) -> Result<(), NovelError> {
        match kind {
            RecordKind::Character => self.characters.add_json(record),
            RecordKind::World => self.worlds.add_json(record),
            RecordKind::Plot => self.plots.add_json(record),
            RecordKind::Scene => self.scenes.add_json(record),
        }
    }

    pub fn find(&self, kind: RecordKind, id: &str) -> Option<serde_json::Value> {
        match kind {
            RecordKind::Character => self.characters.find_json(id),
            RecordKind::World => self.worlds.find_json(id),
            RecordKind::Plot => self.plots.find_json(id),
            RecordKind::Scene => self.scenes.find_json(id),
        }
    }

    pub fn update(
        &mut self,
        kind: RecordKind,
        id: &str,
        patch: serde_json::Value,
    ) -> Result<bool, NovelError> {
        match kind {
            RecordKind::Character => self.characters.update(id, patch),
            RecordKind::World => self.worlds.update(id, patch),
            RecordKind::Plot => self.plots.update(id, patch),
            RecordKind::Scene => self.scenes.update(id, patch),
        }
    }

    pub fn delete(&mut self, kind: RecordKind, id: &str) -> bool {
        match kind {
            RecordKind::Character => self.characters.delete(id),
            RecordKind::World => self.worlds.delete(id),
            RecordKind::Plot => self.plots.delete(id),
            RecordKind::Scene => self.scenes.delete(id),
        }
    }

    /// `(id, title)` for every record of `kind`, in insertion order.
    pub fn summaries(&self, kind: RecordKind) -> Vec<(String, String)> {
        match kind {
            RecordKind::Character => self.characters.summaries(),
            RecordKind::World => self.worlds.summaries(),
            RecordKind::Plot => self.plots.summaries(),
            RecordKind::Scene => self.scenes.summaries(),
        }
    }
}

impl KnowledgeBase for NovelStore {
    fn search(&self, query: &str, limit: usize) -> Vec<KnowledgeHit> {
        let terms: Vec<String> = query
            .split_whitespace()
            .map(|t| t.to_lowercase())
            .collect();
        if terms.is_empty() || limit == 0 {
            return vec![];
        }

        let mut hits = Vec::new();
        self.characters.search_into(&terms, &mut hits);
        self.worlds.search_into(&terms, &mut hits);
        self.plots.search_into(&terms, &mut hits);
        self.scenes.search_into(&terms, &mut hits);

        // Stable sort keeps collection order among equal scores.
        hits.sort_by(|a, b| b.0.cmp(&a.0));
        hits.into_iter().take(limit).map(|(_, hit)| hit).collect()
    }
}
