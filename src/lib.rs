//! # promptvault
//!
//! Versioned prompt templates with variable binding and provider-agnostic
//! execution.
//!
//! ## Features
//!
//! - **Placeholder Tracking**: `{{name}}` placeholders are extracted as the template is edited, and their values are kept across edits
//! - **Version History**: Append new versions, amend one in place, pick the active one, delete, compare with the predecessor
//! - **Execution Requests**: Substitute values into a template and target a configured provider or a bare provider key
//! - **Pure Session State**: Every user action is a transition on an [`EditorState`] value
//! - **Pluggable Backend**: In-memory backend for tests, HTTP backend over any [`remote::Transport`]
//!
//! ## Quick Start
//!
//! ```rust
//! use promptvault::{Config, MemoryBackend, PromptMeta, PromptWorkbench};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut workbench = PromptWorkbench::new(MemoryBackend::new(), Config::default());
//!
//! workbench.edit_meta(PromptMeta::named("greeting"))?;
//! workbench.edit_template("Hello {{name}}, welcome to {{place}}.")?;
//! workbench.set_variable("name", "Alice")?;
//! workbench.set_variable("place", "Wonderland")?;
//!
//! // First save creates the prompt and its version 1
//! workbench.save("initial version")?;
//!
//! // The in-memory backend echoes the substituted prompt
//! let response = workbench.run()?;
//! assert_eq!(response, "Hello Alice, welcome to Wonderland.");
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod bindings;
pub mod config;
pub mod error;
pub mod execution;
pub mod provider;
pub mod remote;
pub mod session;
pub mod template;
pub mod version;

use crate::backend::{NewVersionBody, PromptBackend, VersionPatchBody};
use crate::error::{PromptError, Result};
use crate::execution::{ExecutionRequest, ModelConfig, RequestBuilder};
use crate::provider::{ProviderDirectory, ProviderRef};
use crate::remote::{HttpBackend, Transport};
use crate::session::{Action, EditorState, FetchKind, FetchTicket, Tab};
use crate::template::TemplateEngine;
use crate::version::{PromptId, VersionId, VersionStore};
use tracing::{info, warn};

/// Drives one editing session against a backend
pub struct PromptWorkbench {
    backend: Box<dyn PromptBackend>,
    engine: TemplateEngine,
    config: Config,
    state: EditorState,
}

impl PromptWorkbench {
    /// Start a session for a new, unsaved prompt
    pub fn new(backend: impl PromptBackend + 'static, config: Config) -> Self {
        let history = VersionStore::default().with_numbering(config.numbering);
        let directory = ProviderDirectory::new(Vec::new(), config.legacy_providers.clone());
        let state = EditorState::new(history, directory, config.default_selection());

        Self {
            backend: Box::new(backend),
            engine: TemplateEngine::new(),
            config,
            state,
        }
    }

    /// Session talking HTTP to `config.api_base_url`
    pub fn over_http<T: Transport + 'static>(transport: T, config: Config) -> Self {
        let backend = HttpBackend::new(config.api_base_url.clone(), transport);
        Self::new(backend, config)
    }

    pub fn state(&self) -> &EditorState {
        &self.state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Apply an action; on error the state is unchanged
    pub fn dispatch(&mut self, action: Action) -> Result<()> {
        self.state = self.state.apply(action)?;
        Ok(())
    }

    /// Start a fetch outside the workbench; its result goes back through [`Self::dispatch`]
    pub fn begin_fetch(&mut self, kind: FetchKind) -> FetchTicket {
        let (next, ticket) = self.state.issue_fetch(kind);
        self.state = next;
        ticket
    }

    pub fn edit_template(&mut self, template: impl Into<String>) -> Result<()> {
        self.dispatch(Action::TemplateEdited(template.into()))
    }

    pub fn edit_config(&mut self, config_text: impl Into<String>) -> Result<()> {
        self.dispatch(Action::ConfigEdited(config_text.into()))
    }

    pub fn edit_meta(&mut self, meta: PromptMeta) -> Result<()> {
        self.dispatch(Action::MetaEdited(meta))
    }

    /// Switch between view-only and editable
    pub fn set_read_only(&mut self, read_only: bool) -> Result<()> {
        self.dispatch(Action::ReadOnlySet(read_only))
    }

    pub fn set_variable(&mut self, name: &str, value: impl Into<String>) -> Result<()> {
        self.dispatch(Action::VariableSet {
            name: name.to_string(),
            value: value.into(),
        })
    }

    /// Load a prompt and its history; the draft becomes the active version
    pub fn open(&mut self, prompt_id: PromptId) -> Result<()> {
        let ticket = self.begin_fetch(FetchKind::Prompt);
        let record = self.backend.fetch_prompt(prompt_id)?;
        self.dispatch(Action::PromptLoaded { ticket, record })
    }

    /// Fetch the configured providers
    pub fn load_providers(&mut self) -> Result<()> {
        let ticket = self.begin_fetch(FetchKind::Providers);
        let providers = self.backend.list_providers()?;
        self.dispatch(Action::ProvidersLoaded { ticket, providers })
    }

    fn prompt_id(&self) -> Result<PromptId> {
        self.state
            .history
            .prompt_id()
            .ok_or_else(|| PromptError::InvalidState("the prompt has not been saved".to_string()))
    }

    /// Re-read the prompt after a mutation. The mutation already succeeded,
    /// so a failed re-read is logged rather than returned.
    fn refresh(&mut self, prompt_id: PromptId) {
        if let Err(e) = self.open(prompt_id) {
            warn!("Failed to reload prompt {}: {}", prompt_id, e);
        }
    }

    /// Save the draft as a new version, creating the prompt on first save.
    ///
    /// Returns [`PromptError::PartiallyApplied`] if the prompt was created or
    /// its metadata patched but the version was not appended.
    pub fn save(&mut self, commit_message: &str) -> Result<()> {
        self.state.ensure_editable()?;
        let model_config = ModelConfig::parse(&self.state.draft.config_text)?;
        let history = &self.state.history;
        history.validate_draft(&self.state.draft.template)?;

        let body = NewVersionBody {
            version_number: history.next_version_number()?,
            template: self.state.draft.template.clone(),
            model_config_json: model_config.to_json_string(),
            commit_message: commit_message.to_string(),
            input_variables: self.state.bindings.names(),
        };
        let meta = history.meta().clone();

        let prompt_id = match history.prompt_id() {
            Some(id) => {
                self.backend.update_prompt(id, &meta)?;
                id
            }
            None => {
                let id = self.backend.create_prompt(&meta)?;
                self.state.history.assign_id(id);
                id
            }
        };

        // The prompt record has already changed remotely at this point
        if let Err(e) = self.backend.create_version(prompt_id, &body) {
            return Err(PromptError::PartiallyApplied {
                prompt_id,
                source: Box::new(e),
            });
        }

        info!(
            "Saved version {} of prompt {}",
            body.version_number, prompt_id
        );
        self.refresh(prompt_id);
        Ok(())
    }

    /// Overwrite the version the draft was loaded from
    pub fn update_version(&mut self) -> Result<()> {
        self.state.ensure_editable()?;
        if !self.state.can_amend() {
            return Err(PromptError::InvalidState(
                "the draft is not tied to a saved version".to_string(),
            ));
        }
        let prompt_id = self.prompt_id()?;
        let draft = &self.state.draft;
        let version_id = draft
            .version_id
            .ok_or_else(|| PromptError::InvalidState("no version loaded".to_string()))?;

        let model_config = ModelConfig::parse(&draft.config_text)?;
        let body = VersionPatchBody {
            template: draft.template.clone(),
            model_config_json: model_config.to_json_string(),
            input_variables: self.state.bindings.names(),
        };
        self.backend.update_version(prompt_id, version_id, &body)?;

        self.refresh(prompt_id);
        Ok(())
    }

    pub fn set_active(&mut self, version_id: VersionId) -> Result<()> {
        let prompt_id = self.prompt_id()?;
        self.backend.set_active_version(prompt_id, version_id)?;
        self.refresh(prompt_id);
        Ok(())
    }

    /// Delete a version. The caller is expected to have confirmed with the user.
    pub fn delete_version(&mut self, version_id: VersionId) -> Result<()> {
        let prompt_id = self.prompt_id()?;
        self.backend.delete_version(prompt_id, version_id)?;
        self.refresh(prompt_id);
        Ok(())
    }

    pub fn load_version(&mut self, version_id: VersionId) -> Result<()> {
        self.dispatch(Action::VersionLoaded(version_id))
    }

    pub fn compare(&mut self, version_id: VersionId) -> Result<()> {
        self.dispatch(Action::CompareRequested(version_id))
    }

    pub fn close_comparison(&mut self) -> Result<()> {
        self.dispatch(Action::ComparisonClosed)
    }

    pub fn select_tab(&mut self, tab: Tab) -> Result<()> {
        self.dispatch(Action::TabSelected(tab))
    }

    pub fn select_provider(&mut self, provider: ProviderRef) -> Result<()> {
        self.dispatch(Action::ProviderSelected(provider))
    }

    /// Select by the raw value of a provider picker
    pub fn select_provider_key(&mut self, raw: &str) -> Result<()> {
        let provider = self.state.directory.parse_ref(raw);
        self.select_provider(provider)
    }

    pub fn select_model(&mut self, model_name: impl Into<String>) -> Result<()> {
        self.dispatch(Action::ModelSelected(model_name.into()))
    }

    /// The request a run would send right now
    pub fn build_request(&self) -> Result<ExecutionRequest> {
        RequestBuilder::new(&self.engine, &self.state.directory)
            .max_prompt_length(self.config.max_prompt_length)
            .build(
                &self.state.draft.template,
                &self.state.bindings,
                &self.state.selection,
                &self.state.draft.config_text,
            )
    }

    /// Substitute, send, and wait for the generated text.
    ///
    /// A request that cannot be built fails before the session enters
    /// `Running`; a remote failure leaves the session in `Failed`.
    pub fn run(&mut self) -> Result<String> {
        let request = self.build_request()?;
        self.dispatch(Action::RunStarted)?;
        info!(
            "Running prompt against {}/{}",
            request.model_provider, request.model_name
        );

        match self.backend.execute(&request) {
            Ok(response) => {
                self.dispatch(Action::RunFinished(Ok(response.clone())))?;
                Ok(response)
            }
            Err(e) => {
                self.dispatch(Action::RunFinished(Err(e.to_string())))?;
                Err(e)
            }
        }
    }
}

// Re-export important types
pub use crate::backend::MemoryBackend;
pub use crate::bindings::VariableBindings;
pub use crate::config::Config;
pub use crate::version::{PromptMeta, Version};
