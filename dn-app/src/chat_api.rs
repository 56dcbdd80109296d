use crate::assistant::{ChatError, CompletionClient, CompletionResponse};
use crate::settings::{Settings, SettingsError, SettingsStore};
use dn_llm::ChatMessage;

/// Settings store and completion client kept in step: whenever settings are
/// loaded or saved, the client is rebuilt around the current key.
pub struct ChatApi {
    settings: SettingsStore,
    client: CompletionClient,
}

impl ChatApi {
    pub fn new(settings: SettingsStore, client: CompletionClient) -> Self {
        Self { settings, client }
    }

    pub async fn load_settings(&mut self) -> &Settings {
        let loaded = self.settings.load().await;
        self.client.initialize(&loaded.api_key);
        self.settings.current()
    }

    pub async fn save_settings(&mut self, settings: Settings) -> Result<(), SettingsError> {
        self.settings.save(settings).await?;
        let key = self.settings.current().api_key.clone();
        self.client.initialize(&key);
        tracing::info!(
            has_credential = self.client.is_initialized(),
            temperature = self.settings.current().temperature,
            "chat settings saved"
        );
        Ok(())
    }

    pub fn settings(&self) -> &Settings {
        self.settings.current()
    }

    pub fn is_ready(&self) -> bool {
        self.client.is_initialized()
    }

    pub async fn send(&self, transcript: &[ChatMessage]) -> Result<CompletionResponse, ChatError> {
        self.client
            .send(transcript, self.settings.current().temperature)
            .await
    }
}
