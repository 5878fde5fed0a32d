//! Configured text-generation providers and the user's provider/model choice.

use crate::error::{PromptError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type ProviderId = u64;

/// A model offered by a configured provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
    pub id: u64,
    pub name: String,
}

/// A provider entry as returned by `GET /providers/`
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    pub id: ProviderId,
    pub name: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub models: Vec<Model>,
}

impl Provider {
    /// Lower-cased name, sent as `model_provider`
    pub fn key(&self) -> String {
        self.name.to_lowercase()
    }

    pub fn first_model(&self) -> Option<&str> {
        self.models.first().map(|m| m.name.as_str())
    }

    pub fn has_model(&self, name: &str) -> bool {
        self.models.iter().any(|m| m.name == name)
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("models", &self.models)
            .finish()
    }
}

/// Which provider a run targets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderRef {
    /// A provider from the directory
    Configured(ProviderId),
    /// A bare provider key such as `openai`, used when nothing is configured
    Legacy(String),
}

impl ProviderRef {
    /// Numeric text names a configured provider; anything else is a legacy key
    pub fn parse(raw: &str) -> Self {
        match raw.trim().parse::<ProviderId>() {
            Ok(id) => ProviderRef::Configured(id),
            Err(_) => ProviderRef::Legacy(raw.trim().to_string()),
        }
    }
}

/// Provider plus model name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSelection {
    pub provider: ProviderRef,
    pub model_name: String,
}

impl ProviderSelection {
    pub fn legacy(key: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            provider: ProviderRef::Legacy(key.into()),
            model_name: model_name.into(),
        }
    }
}

/// `provider_id` / `model_provider` pair derived from a selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedProvider {
    pub provider_id: Option<ProviderId>,
    pub model_provider: String,
}

/// The providers available to the session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderDirectory {
    providers: Vec<Provider>,
    legacy: Vec<String>,
}

impl ProviderDirectory {
    pub fn new(providers: Vec<Provider>, legacy: Vec<String>) -> Self {
        Self { providers, legacy }
    }

    pub fn providers(&self) -> &[Provider] {
        &self.providers
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn legacy_keys(&self) -> &[String] {
        &self.legacy
    }

    pub fn get(&self, id: ProviderId) -> Option<&Provider> {
        self.providers.iter().find(|p| p.id == id)
    }

    fn require(&self, id: ProviderId) -> Result<&Provider> {
        self.get(id)
            .ok_or_else(|| PromptError::NotFound(format!("provider {id}")))
    }

    /// Interpret a selection string against the directory. Numeric text that
    /// matches no configured provider is kept as a legacy key.
    pub fn parse_ref(&self, raw: &str) -> ProviderRef {
        match ProviderRef::parse(raw) {
            ProviderRef::Configured(id) if self.get(id).is_none() => {
                ProviderRef::Legacy(raw.trim().to_string())
            }
            parsed => parsed,
        }
    }

    /// Choices to offer: configured providers, or the legacy keys when there are none
    pub fn options(&self) -> Vec<ProviderRef> {
        if self.providers.is_empty() {
            self.legacy.iter().cloned().map(ProviderRef::Legacy).collect()
        } else {
            self.providers
                .iter()
                .map(|p| ProviderRef::Configured(p.id))
                .collect()
        }
    }

    /// First configured provider with its first model, if any
    pub fn default_selection(&self) -> Option<ProviderSelection> {
        self.providers.first().map(|p| ProviderSelection {
            provider: ProviderRef::Configured(p.id),
            model_name: p.first_model().unwrap_or_default().to_string(),
        })
    }

    /// Switch provider. A configured provider with models resets the model
    /// to its first one; otherwise `current_model` is kept.
    pub fn select(&self, provider: ProviderRef, current_model: &str) -> Result<ProviderSelection> {
        let model_name = match &provider {
            ProviderRef::Configured(id) => self
                .require(*id)?
                .first_model()
                .unwrap_or(current_model)
                .to_string(),
            ProviderRef::Legacy(_) => current_model.to_string(),
        };
        Ok(ProviderSelection {
            provider,
            model_name,
        })
    }

    /// Derive the wire identifiers for a selection and check the model name
    pub fn resolve(&self, selection: &ProviderSelection) -> Result<ResolvedProvider> {
        if selection.model_name.trim().is_empty() {
            return Err(PromptError::Validation("a model name is required".to_string()));
        }

        match &selection.provider {
            ProviderRef::Configured(id) => {
                let provider = self.require(*id)?;
                if !provider.models.is_empty() && !provider.has_model(&selection.model_name) {
                    return Err(PromptError::Validation(format!(
                        "provider '{}' has no model named '{}'",
                        provider.name, selection.model_name
                    )));
                }
                Ok(ResolvedProvider {
                    provider_id: Some(provider.id),
                    model_provider: provider.key(),
                })
            }
            ProviderRef::Legacy(key) => {
                if key.trim().is_empty() {
                    return Err(PromptError::Validation(
                        "a provider must be selected".to_string(),
                    ));
                }
                Ok(ResolvedProvider {
                    provider_id: None,
                    model_provider: key.clone(),
                })
            }
        }
    }
}
