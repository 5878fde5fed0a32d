//! Prompt version history.
//!
//! A [`VersionStore`] holds one prompt's metadata, its versions and the
//! active-version pointer. Every mutation either applies completely or
//! returns an error with the store untouched.

use crate::error::{PromptError, Result};
use crate::execution::ModelConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info};

pub type PromptId = u64;
pub type VersionId = u64;

/// How the next `version_number` is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionNumbering {
    /// `count(versions) + 1`. After a deletion this can repeat an existing number.
    #[default]
    CountBased,
    /// `max(version_number) + 1`. Never repeats a live number.
    MaxBased,
}

/// Editable prompt metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMeta {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Option<String>,
}

impl PromptMeta {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// One snapshot in a prompt's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    pub id: VersionId,
    pub version_number: u32,
    pub template: String,
    #[serde(default)]
    pub model_config_json: String,
    #[serde(default)]
    pub commit_message: Option<String>,
    /// Variable names captured at save time. Informational only.
    #[serde(default, deserialize_with = "deserialize_input_variables")]
    pub input_variables: Vec<String>,
    /// Absent when the backend did not report one
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Version {
    /// Parse the stored model configuration
    pub fn model_config(&self) -> Result<ModelConfig> {
        ModelConfig::parse(&self.model_config_json)
    }
}

/// Older clients stored the variable list as a JSON-encoded string.
fn deserialize_input_variables<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        List(Vec<String>),
        Encoded(String),
        Null(()),
    }

    match Raw::deserialize(deserializer)? {
        Raw::List(list) => Ok(list),
        Raw::Encoded(text) if text.trim().is_empty() => Ok(Vec::new()),
        Raw::Encoded(text) => serde_json::from_str(&text).map_err(serde::de::Error::custom),
        Raw::Null(()) => Ok(Vec::new()),
    }
}

/// A prompt with its full history, as returned by `GET /prompts/{id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptRecord {
    pub id: PromptId,
    #[serde(flatten)]
    pub meta: PromptMeta,
    #[serde(default)]
    pub active_version_id: Option<VersionId>,
    #[serde(default)]
    pub versions: Vec<Version>,
}

/// Input for a new history entry
#[derive(Debug, Clone, PartialEq)]
pub struct VersionDraft {
    pub template: String,
    pub model_config: ModelConfig,
    pub commit_message: String,
    pub input_variables: Vec<String>,
}

/// Fields an amend may change
#[derive(Debug, Clone, PartialEq)]
pub struct VersionUpdate {
    pub template: String,
    pub model_config: ModelConfig,
    pub input_variables: Vec<String>,
}

/// Two templates surfaced side by side, oldest first
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub older: Version,
    pub newer: Version,
}

/// The version `active_id` names, or the highest-numbered one when it names nothing in `versions`
pub fn resolve_active(active_id: Option<VersionId>, versions: &[Version]) -> Option<&Version> {
    active_id
        .and_then(|id| versions.iter().find(|v| v.id == id))
        .or_else(|| versions.iter().max_by_key(|v| v.version_number))
}

/// The version with the greatest number strictly below `version`'s
pub fn find_predecessor<'a>(versions: &'a [Version], version: &Version) -> Option<&'a Version> {
    versions
        .iter()
        .filter(|v| v.version_number < version.version_number)
        .max_by_key(|v| v.version_number)
}

/// In-memory history of a single prompt
#[derive(Debug, Clone, PartialEq)]
pub struct VersionStore {
    prompt_id: Option<PromptId>,
    meta: PromptMeta,
    active_version_id: Option<VersionId>,
    versions: Vec<Version>,
    numbering: VersionNumbering,
    next_id: VersionId,
}

impl Default for VersionStore {
    fn default() -> Self {
        Self::new(PromptMeta::default())
    }
}

impl VersionStore {
    /// A prompt that has not been saved yet
    pub fn new(meta: PromptMeta) -> Self {
        Self {
            prompt_id: None,
            meta,
            active_version_id: None,
            versions: Vec::new(),
            numbering: VersionNumbering::default(),
            next_id: 1,
        }
    }

    /// Mirror a prompt fetched from the backend
    pub fn from_record(record: PromptRecord) -> Self {
        let next_id = record.versions.iter().map(|v| v.id).max().unwrap_or(0) + 1;
        Self {
            prompt_id: Some(record.id),
            meta: record.meta,
            active_version_id: record.active_version_id,
            versions: record.versions,
            numbering: VersionNumbering::default(),
            next_id,
        }
    }

    pub fn with_numbering(mut self, numbering: VersionNumbering) -> Self {
        self.numbering = numbering;
        self
    }

    /// Snapshot in wire form; `None` until the prompt has an id
    pub fn to_record(&self) -> Option<PromptRecord> {
        self.prompt_id.map(|id| PromptRecord {
            id,
            meta: self.meta.clone(),
            active_version_id: self.active_version_id,
            versions: self.versions.clone(),
        })
    }

    pub fn prompt_id(&self) -> Option<PromptId> {
        self.prompt_id
    }

    pub fn assign_id(&mut self, id: PromptId) {
        self.prompt_id = Some(id);
    }

    pub fn is_new(&self) -> bool {
        self.prompt_id.is_none()
    }

    pub fn meta(&self) -> &PromptMeta {
        &self.meta
    }

    pub fn set_meta(&mut self, meta: PromptMeta) {
        self.meta = meta;
    }

    pub fn numbering(&self) -> VersionNumbering {
        self.numbering
    }

    pub fn active_version_id(&self) -> Option<VersionId> {
        self.active_version_id
    }

    /// Versions in the order they were recorded
    pub fn versions(&self) -> &[Version] {
        &self.versions
    }

    pub fn get(&self, version_id: VersionId) -> Option<&Version> {
        self.versions.iter().find(|v| v.id == version_id)
    }

    fn require(&self, version_id: VersionId) -> Result<&Version> {
        self.get(version_id).ok_or_else(|| {
            PromptError::NotFound(format!(
                "version {} of prompt {}",
                version_id,
                self.describe_prompt()
            ))
        })
    }

    fn describe_prompt(&self) -> String {
        match self.prompt_id {
            Some(id) => id.to_string(),
            None => format!("'{}' (unsaved)", self.meta.name),
        }
    }

    /// The number the next appended version will receive
    pub fn next_version_number(&self) -> Result<u32> {
        let current = match self.numbering {
            VersionNumbering::CountBased => u32::try_from(self.versions.len()).ok(),
            VersionNumbering::MaxBased => {
                Some(self.versions.iter().map(|v| v.version_number).max().unwrap_or(0))
            }
        };
        current
            .and_then(|n| n.checked_add(1))
            .ok_or_else(|| PromptError::Validation("version numbers exhausted".to_string()))
    }

    /// Check a save is allowed. A first save must establish a name and a template.
    pub fn validate_draft(&self, template: &str) -> Result<()> {
        if self.is_new() {
            if self.meta.name.trim().is_empty() {
                return Err(PromptError::Validation(
                    "a new prompt needs a name before its first save".to_string(),
                ));
            }
            if template.trim().is_empty() {
                return Err(PromptError::Validation(
                    "a new prompt needs a template before its first save".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Append a new version numbered by the store's numbering policy.
    ///
    /// The active-version pointer is not touched.
    pub fn append(&mut self, draft: VersionDraft) -> Result<&Version> {
        self.validate_draft(&draft.template)?;
        let number = self.next_version_number()?;
        self.record(number, draft)
    }

    /// Append a version under a caller-chosen number
    pub fn record(&mut self, version_number: u32, draft: VersionDraft) -> Result<&Version> {
        if version_number == 0 {
            return Err(PromptError::Validation(
                "version numbers start at 1".to_string(),
            ));
        }

        let version = Version {
            id: self.next_id,
            version_number,
            template: draft.template,
            model_config_json: draft.model_config.to_json_string(),
            commit_message: Some(draft.commit_message),
            input_variables: draft.input_variables,
            created_at: Some(Utc::now()),
        };
        self.next_id += 1;

        info!(
            "Appended version {} (id {}) to prompt {}",
            version.version_number,
            version.id,
            self.describe_prompt()
        );
        self.versions.push(version);
        Ok(&self.versions[self.versions.len() - 1])
    }

    /// Overwrite a version's template, config and variable list in place
    pub fn amend(&mut self, version_id: VersionId, update: VersionUpdate) -> Result<&Version> {
        self.require(version_id)?;
        let prompt = self.describe_prompt();

        let version = self
            .versions
            .iter_mut()
            .find(|v| v.id == version_id)
            .ok_or_else(|| PromptError::NotFound(format!("version {version_id}")))?;
        version.template = update.template;
        version.model_config_json = update.model_config.to_json_string();
        version.input_variables = update.input_variables;

        info!(
            "Amended version {} (id {}) of prompt {}",
            version.version_number, version.id, prompt
        );
        Ok(version)
    }

    /// Point the prompt at one of its versions
    pub fn activate(&mut self, version_id: VersionId) -> Result<()> {
        self.require(version_id)?;
        self.active_version_id = Some(version_id);
        info!(
            "Activated version id {} of prompt {}",
            version_id,
            self.describe_prompt()
        );
        Ok(())
    }

    /// Remove a version. Remaining versions keep their numbers and the
    /// active pointer is left as is, even when it named the deleted version.
    pub fn delete(&mut self, version_id: VersionId) -> Result<Version> {
        self.require(version_id)?;
        let index = self
            .versions
            .iter()
            .position(|v| v.id == version_id)
            .ok_or_else(|| PromptError::NotFound(format!("version {version_id}")))?;
        let removed = self.versions.remove(index);

        info!(
            "Deleted version {} (id {}) of prompt {}",
            removed.version_number,
            removed.id,
            self.describe_prompt()
        );
        if self.active_is_dangling() {
            debug!("Active pointer of prompt {} now dangles", self.describe_prompt());
        }
        Ok(removed)
    }

    /// The active version, falling back to the highest-numbered one
    pub fn resolve_active(&self) -> Option<&Version> {
        resolve_active(self.active_version_id, &self.versions)
    }

    /// Whether the active pointer names a version that no longer exists
    pub fn active_is_dangling(&self) -> bool {
        self.active_version_id
            .is_some_and(|id| self.get(id).is_none())
    }

    pub fn find_predecessor(&self, version_id: VersionId) -> Result<Option<&Version>> {
        let version = self.require(version_id)?;
        Ok(find_predecessor(&self.versions, version))
    }

    /// Pair a version with its predecessor for side-by-side display
    pub fn compare(&self, version_id: VersionId) -> Result<Comparison> {
        let newer = self.require(version_id)?;
        let older = find_predecessor(&self.versions, newer).ok_or_else(|| {
            PromptError::NotFound(format!(
                "no version precedes version {}",
                newer.version_number
            ))
        })?;
        Ok(Comparison {
            older: older.clone(),
            newer: newer.clone(),
        })
    }

    /// Versions newest first
    pub fn history(&self) -> Vec<&Version> {
        let mut history: Vec<&Version> = self.versions.iter().collect();
        history.sort_by(|a, b| b.version_number.cmp(&a.version_number));
        history
    }
}
