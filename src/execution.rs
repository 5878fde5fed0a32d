//! Building execution requests and tracking the single in-flight run.

use crate::bindings::VariableBindings;
use crate::error::{PromptError, Result};
use crate::provider::{ProviderDirectory, ProviderId, ProviderSelection};
use crate::template::TemplateEngine;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// Model configuration attached to a version.
///
/// Must be a JSON object; its contents are passed through to the provider
/// without further checks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelConfig(Map<String, Value>);

impl ModelConfig {
    /// Parse config text. Blank text is an empty config.
    pub fn parse(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }

        match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => Ok(Self(map)),
            Ok(other) => Err(PromptError::ConfigParse(format!(
                "expected a JSON object, found {}",
                json_kind(&other)
            ))),
            Err(e) => Err(PromptError::ConfigParse(e.to_string())),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_json_string(&self) -> String {
        Value::Object(self.0.clone()).to_string()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Body of `POST /execute/`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub provider_id: Option<ProviderId>,
    pub model_provider: String,
    pub model_name: String,
    pub prompt_text: String,
    pub config: ModelConfig,
}

/// Turns an editor draft into an [`ExecutionRequest`]
pub struct RequestBuilder<'a> {
    engine: &'a TemplateEngine,
    directory: &'a ProviderDirectory,
    max_prompt_length: usize,
}

impl<'a> RequestBuilder<'a> {
    pub fn new(engine: &'a TemplateEngine, directory: &'a ProviderDirectory) -> Self {
        Self {
            engine,
            directory,
            max_prompt_length: usize::MAX,
        }
    }

    pub fn max_prompt_length(mut self, limit: usize) -> Self {
        self.max_prompt_length = limit;
        self
    }

    /// Substitute bindings, parse the config and resolve the provider.
    ///
    /// Any failure means no request is produced.
    pub fn build(
        &self,
        template: &str,
        bindings: &VariableBindings,
        selection: &ProviderSelection,
        model_config_text: &str,
    ) -> Result<ExecutionRequest> {
        let config = ModelConfig::parse(model_config_text)?;
        let resolved = self.directory.resolve(selection)?;

        let prompt_text = self.engine.render(template, bindings);
        let length = prompt_text.chars().count();
        if length > self.max_prompt_length {
            return Err(PromptError::Validation(format!(
                "Prompt exceeds maximum length of {} characters",
                self.max_prompt_length
            )));
        }

        debug!(
            "Built execution request for {}/{} ({} chars)",
            resolved.model_provider, selection.model_name, length
        );
        Ok(ExecutionRequest {
            provider_id: resolved.provider_id,
            model_provider: resolved.model_provider,
            model_name: selection.model_name.clone(),
            prompt_text,
            config,
        })
    }
}

/// Lifecycle of the session's run: `Idle -> Running -> Succeeded | Failed -> Idle`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ExecutionPhase {
    #[default]
    Idle,
    Running,
    Succeeded { response: String },
    Failed { message: String },
}

impl ExecutionPhase {
    pub fn is_running(&self) -> bool {
        matches!(self, ExecutionPhase::Running)
    }

    /// Enter `Running`. A finished result is discarded; a running one is an error.
    pub fn start(&self) -> Result<ExecutionPhase> {
        if self.is_running() {
            return Err(PromptError::ExecutionInProgress);
        }
        Ok(ExecutionPhase::Running)
    }

    /// Record the outcome of the running execution
    pub fn finish(&self, outcome: std::result::Result<String, String>) -> Result<ExecutionPhase> {
        if !self.is_running() {
            return Err(PromptError::InvalidState(
                "no execution is running".to_string(),
            ));
        }
        Ok(match outcome {
            Ok(response) => ExecutionPhase::Succeeded { response },
            Err(message) => ExecutionPhase::Failed { message },
        })
    }

    /// Clear a finished result. Has no effect while running.
    pub fn dismiss(&self) -> ExecutionPhase {
        match self {
            ExecutionPhase::Running => ExecutionPhase::Running,
            _ => ExecutionPhase::Idle,
        }
    }
}
