//! The prompt service the workbench talks to.
//!
//! [`PromptBackend`] mirrors the service's REST endpoints one method per
//! call. [`MemoryBackend`] keeps everything in process and is what the tests
//! and demos run against; [`crate::remote::HttpBackend`] speaks HTTP.

use crate::error::{PromptError, Result};
use crate::execution::{ExecutionRequest, ModelConfig};
use crate::provider::Provider;
use crate::version::{
    PromptId, PromptMeta, PromptRecord, VersionDraft, VersionId, VersionStore, VersionUpdate,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// Body of `POST /prompts/{id}/versions`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewVersionBody {
    pub version_number: u32,
    pub template: String,
    pub model_config_json: String,
    pub commit_message: String,
    pub input_variables: Vec<String>,
}

/// Body of `PATCH /prompts/{id}/versions/{version_id}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionPatchBody {
    pub template: String,
    pub model_config_json: String,
    pub input_variables: Vec<String>,
}

/// Response of `POST /prompts/`; other fields are ignored
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedPrompt {
    pub id: PromptId,
}

/// Response of `POST /execute/`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub response: String,
}

/// Remote operations the workbench depends on
pub trait PromptBackend: Send + Sync {
    /// `GET /prompts/{id}`
    fn fetch_prompt(&self, prompt_id: PromptId) -> Result<PromptRecord>;

    /// `POST /prompts/`
    fn create_prompt(&self, meta: &PromptMeta) -> Result<PromptId>;

    /// `PATCH /prompts/{id}`
    fn update_prompt(&self, prompt_id: PromptId, meta: &PromptMeta) -> Result<()>;

    /// `POST /prompts/{id}/versions`
    fn create_version(&self, prompt_id: PromptId, body: &NewVersionBody) -> Result<()>;

    /// `PATCH /prompts/{id}/versions/{version_id}`
    fn update_version(
        &self,
        prompt_id: PromptId,
        version_id: VersionId,
        body: &VersionPatchBody,
    ) -> Result<()>;

    /// `POST /prompts/{id}/versions/{version_id}/set-active`
    fn set_active_version(&self, prompt_id: PromptId, version_id: VersionId) -> Result<()>;

    /// `DELETE /prompts/{id}/versions/{version_id}`
    fn delete_version(&self, prompt_id: PromptId, version_id: VersionId) -> Result<()>;

    /// `GET /providers/`
    fn list_providers(&self) -> Result<Vec<Provider>>;

    /// `POST /execute/`; returns the generated text
    fn execute(&self, request: &ExecutionRequest) -> Result<String>;
}

type Responder = Box<dyn Fn(&ExecutionRequest) -> Result<String> + Send + Sync>;

#[derive(Default)]
struct MemoryState {
    prompts: BTreeMap<PromptId, VersionStore>,
    providers: Vec<Provider>,
    next_prompt_id: PromptId,
}

/// In-process backend over [`VersionStore`]s
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
    responder: Responder,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Backend whose executions echo the prompt text
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState {
                next_prompt_id: 1,
                ..MemoryState::default()
            }),
            responder: Box::new(|request| Ok(request.prompt_text.clone())),
        }
    }

    /// Replace the execution handler
    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(&ExecutionRequest) -> Result<String> + Send + Sync + 'static,
    {
        self.responder = Box::new(responder);
        self
    }

    pub fn with_providers(self, providers: Vec<Provider>) -> Result<Self> {
        self.lock()?.providers = providers;
        Ok(self)
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| PromptError::remote("memory backend state is poisoned"))
    }

    fn with_prompt<T>(
        &self,
        prompt_id: PromptId,
        f: impl FnOnce(&mut VersionStore) -> Result<T>,
    ) -> Result<T> {
        let mut state = self.lock()?;
        let store = state
            .prompts
            .get_mut(&prompt_id)
            .ok_or_else(|| PromptError::NotFound(format!("prompt {prompt_id}")))?;
        f(store)
    }
}

impl PromptBackend for MemoryBackend {
    fn fetch_prompt(&self, prompt_id: PromptId) -> Result<PromptRecord> {
        self.with_prompt(prompt_id, |store| {
            store
                .to_record()
                .ok_or_else(|| PromptError::NotFound(format!("prompt {prompt_id}")))
        })
    }

    fn create_prompt(&self, meta: &PromptMeta) -> Result<PromptId> {
        if meta.name.trim().is_empty() {
            return Err(PromptError::Validation("prompt name is required".to_string()));
        }

        let mut state = self.lock()?;
        let id = state.next_prompt_id;
        state.next_prompt_id += 1;

        let mut store = VersionStore::new(meta.clone());
        store.assign_id(id);
        state.prompts.insert(id, store);

        info!("Created prompt {} ('{}')", id, meta.name);
        Ok(id)
    }

    fn update_prompt(&self, prompt_id: PromptId, meta: &PromptMeta) -> Result<()> {
        self.with_prompt(prompt_id, |store| {
            store.set_meta(meta.clone());
            Ok(())
        })
    }

    fn create_version(&self, prompt_id: PromptId, body: &NewVersionBody) -> Result<()> {
        let draft = VersionDraft {
            template: body.template.clone(),
            model_config: ModelConfig::parse(&body.model_config_json)?,
            commit_message: body.commit_message.clone(),
            input_variables: body.input_variables.clone(),
        };
        self.with_prompt(prompt_id, |store| {
            store.record(body.version_number, draft).map(|_| ())
        })
    }

    fn update_version(
        &self,
        prompt_id: PromptId,
        version_id: VersionId,
        body: &VersionPatchBody,
    ) -> Result<()> {
        let update = VersionUpdate {
            template: body.template.clone(),
            model_config: ModelConfig::parse(&body.model_config_json)?,
            input_variables: body.input_variables.clone(),
        };
        self.with_prompt(prompt_id, |store| store.amend(version_id, update).map(|_| ()))
    }

    fn set_active_version(&self, prompt_id: PromptId, version_id: VersionId) -> Result<()> {
        self.with_prompt(prompt_id, |store| store.activate(version_id))
    }

    fn delete_version(&self, prompt_id: PromptId, version_id: VersionId) -> Result<()> {
        self.with_prompt(prompt_id, |store| store.delete(version_id).map(|_| ()))
    }

    fn list_providers(&self) -> Result<Vec<Provider>> {
        Ok(self.lock()?.providers.clone())
    }

    fn execute(&self, request: &ExecutionRequest) -> Result<String> {
        debug!(
            "Executing against {}/{}",
            request.model_provider, request.model_name
        );
        (self.responder)(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(number: u32, template: &str) -> NewVersionBody {
        NewVersionBody {
            version_number: number,
            template: template.to_string(),
            model_config_json: "{}".to_string(),
            commit_message: "initial".to_string(),
            input_variables: Vec::new(),
        }
    }

    #[test]
    fn test_memory_backend_version_lifecycle() {
        let backend = MemoryBackend::new();
        let id = backend.create_prompt(&PromptMeta::named("support")).unwrap();

        backend.create_version(id, &body(1, "v1")).unwrap();
        backend.create_version(id, &body(2, "v2")).unwrap();

        let record = backend.fetch_prompt(id).unwrap();
        assert_eq!(record.meta.name, "support");
        assert_eq!(record.versions.len(), 2);

        let first = record.versions[0].id;
        backend.set_active_version(id, first).unwrap();
        backend
            .update_version(
                id,
                first,
                &VersionPatchBody {
                    template: "v1 amended".to_string(),
                    model_config_json: r#"{"top_p": 1}"#.to_string(),
                    input_variables: Vec::new(),
                },
            )
            .unwrap();

        let record = backend.fetch_prompt(id).unwrap();
        assert_eq!(record.active_version_id, Some(first));
        assert_eq!(record.versions[0].template, "v1 amended");
        assert_eq!(record.versions[0].version_number, 1);

        backend.delete_version(id, first).unwrap();
        let record = backend.fetch_prompt(id).unwrap();
        assert_eq!(record.versions.len(), 1);
        assert_eq!(record.active_version_id, Some(first));
    }

    #[test]
    fn test_memory_backend_not_found() {
        let backend = MemoryBackend::new();
        assert!(matches!(backend.fetch_prompt(9), Err(PromptError::NotFound(_))));

        let id = backend.create_prompt(&PromptMeta::named("p")).unwrap();
        assert!(matches!(
            backend.set_active_version(id, 77),
            Err(PromptError::NotFound(_))
        ));
    }

    #[test]
    fn test_memory_backend_rejects_malformed_config() {
        let backend = MemoryBackend::new();
        let id = backend.create_prompt(&PromptMeta::named("p")).unwrap();
        let mut bad = body(1, "x");
        bad.model_config_json = "{".to_string();
        assert!(matches!(
            backend.create_version(id, &bad),
            Err(PromptError::ConfigParse(_))
        ));
        assert!(backend.fetch_prompt(id).unwrap().versions.is_empty());
    }

    #[test]
    fn test_custom_responder() {
        let backend = MemoryBackend::new().with_responder(|request| {
            Ok(format!("[{}] {}", request.model_name, request.prompt_text.len()))
        });
        let request = ExecutionRequest {
            provider_id: None,
            model_provider: "openai".to_string(),
            model_name: "gpt-4o".to_string(),
            prompt_text: "hello".to_string(),
            config: ModelConfig::default(),
        };
        assert_eq!(backend.execute(&request).unwrap(), "[gpt-4o] 5");
    }
}
