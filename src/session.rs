//! Editing-session state as a value.
//!
//! Every user action and every network response is an [`Action`];
//! [`EditorState::apply`] maps the current state and an action to the next
//! state without touching the original. A rejected action returns an error
//! and the caller keeps the state it had.

use crate::bindings::VariableBindings;
use crate::error::{PromptError, Result};
use crate::execution::ExecutionPhase;
use crate::provider::{Provider, ProviderDirectory, ProviderRef, ProviderSelection};
use crate::template::TemplateEngine;
use crate::version::{Comparison, PromptMeta, PromptRecord, Version, VersionId, VersionStore};
use tracing::{debug, warn};

/// Which remote read a ticket belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    Prompt,
    Providers,
}

/// Issued when a fetch starts; only the most recent ticket of a kind is accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    kind: FetchKind,
    seq: u64,
}

impl FetchTicket {
    pub fn kind(&self) -> FetchKind {
        self.kind
    }
}

/// Per-kind sequence counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestFence {
    prompt: u64,
    providers: u64,
}

impl RequestFence {
    fn counter(&mut self, kind: FetchKind) -> &mut u64 {
        match kind {
            FetchKind::Prompt => &mut self.prompt,
            FetchKind::Providers => &mut self.providers,
        }
    }

    pub fn issue(&mut self, kind: FetchKind) -> FetchTicket {
        let counter = self.counter(kind);
        *counter += 1;
        FetchTicket { kind, seq: *counter }
    }

    pub fn is_current(&self, ticket: FetchTicket) -> bool {
        let latest = match ticket.kind {
            FetchKind::Prompt => self.prompt,
            FetchKind::Providers => self.providers,
        };
        ticket.seq == latest
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Tab {
    #[default]
    Editor,
    History,
}

/// The template and config being edited
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    /// Persisted version this draft was loaded from, if any
    pub version_id: Option<VersionId>,
    pub version_number: Option<u32>,
    pub template: String,
    pub config_text: String,
}

impl Default for Draft {
    fn default() -> Self {
        Self {
            version_id: None,
            version_number: None,
            template: String::new(),
            config_text: "{}".to_string(),
        }
    }
}

impl Draft {
    fn from_version(version: &Version) -> Self {
        Self {
            version_id: Some(version.id),
            version_number: Some(version.version_number),
            template: version.template.clone(),
            config_text: version.model_config_json.clone(),
        }
    }
}

/// Everything that can happen to a session
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    TemplateEdited(String),
    ConfigEdited(String),
    MetaEdited(PromptMeta),
    VariableSet { name: String, value: String },
    PromptLoaded { ticket: FetchTicket, record: PromptRecord },
    ProvidersLoaded { ticket: FetchTicket, providers: Vec<Provider> },
    ProviderSelected(ProviderRef),
    ModelSelected(String),
    VersionLoaded(VersionId),
    TabSelected(Tab),
    CompareRequested(VersionId),
    ComparisonClosed,
    RunStarted,
    RunFinished(std::result::Result<String, String>),
    ResultDismissed,
    ReadOnlySet(bool),
}

impl Action {
    /// Whether the action changes the draft or the prompt metadata
    fn edits_prompt(&self) -> bool {
        matches!(
            self,
            Action::TemplateEdited(_) | Action::ConfigEdited(_) | Action::MetaEdited(_)
        )
    }
}

/// One editing session
#[derive(Debug, Clone, PartialEq)]
pub struct EditorState {
    pub history: VersionStore,
    pub draft: Draft,
    pub bindings: VariableBindings,
    pub tab: Tab,
    pub comparison: Option<Comparison>,
    pub directory: ProviderDirectory,
    pub selection: ProviderSelection,
    /// Set once the user or a provider load has picked a provider
    pub provider_chosen: bool,
    pub execution: ExecutionPhase,
    pub fence: RequestFence,
    /// View-only session: the prompt can be browsed and run but not changed
    pub read_only: bool,
}

impl EditorState {
    /// A blank session for a new prompt
    pub fn new(history: VersionStore, directory: ProviderDirectory, selection: ProviderSelection) -> Self {
        Self {
            history,
            draft: Draft::default(),
            bindings: VariableBindings::new(),
            tab: Tab::Editor,
            comparison: None,
            directory,
            selection,
            provider_chosen: false,
            execution: ExecutionPhase::Idle,
            fence: RequestFence::default(),
            read_only: false,
        }
    }

    /// Start a fetch and return the ticket its response must carry
    pub fn issue_fetch(&self, kind: FetchKind) -> (EditorState, FetchTicket) {
        let mut next = self.clone();
        let ticket = next.fence.issue(kind);
        (next, ticket)
    }

    /// Next state after `action`
    pub fn apply(&self, action: Action) -> Result<EditorState> {
        if action.edits_prompt() {
            self.ensure_editable()?;
        }
        let mut next = self.clone();

        match action {
            Action::TemplateEdited(template) => {
                next.draft.template = template;
                next.rebind();
            }
            Action::ConfigEdited(text) => next.draft.config_text = text,
            Action::MetaEdited(meta) => next.history.set_meta(meta),
            Action::VariableSet { name, value } => {
                if !next.bindings.set(&name, value) {
                    return Err(PromptError::Validation(format!(
                        "'{name}' is not a variable of the current template"
                    )));
                }
            }
            Action::PromptLoaded { ticket, record } => {
                if !self.fence.is_current(ticket) {
                    warn!("Discarding stale response for prompt {}", record.id);
                    return Ok(next);
                }
                let numbering = next.history.numbering();
                next.history = VersionStore::from_record(record).with_numbering(numbering);
                next.draft = next
                    .history
                    .resolve_active()
                    .map(Draft::from_version)
                    .unwrap_or_default();
                next.comparison = None;
                next.rebind();
            }
            Action::ProvidersLoaded { ticket, providers } => {
                if !self.fence.is_current(ticket) {
                    warn!("Discarding stale provider list");
                    return Ok(next);
                }
                let legacy = self.directory.legacy_keys().to_vec();
                next.directory = ProviderDirectory::new(providers, legacy);
                if !next.provider_chosen {
                    if let Some(selection) = next.directory.default_selection() {
                        next.selection = selection;
                        next.provider_chosen = true;
                    }
                }
            }
            Action::ProviderSelected(provider) => {
                next.selection = next
                    .directory
                    .select(provider, &self.selection.model_name)?;
                next.provider_chosen = true;
            }
            Action::ModelSelected(model_name) => next.selection.model_name = model_name,
            Action::VersionLoaded(version_id) => {
                let version = next.history.get(version_id).ok_or_else(|| {
                    PromptError::NotFound(format!("version {version_id}"))
                })?;
                next.draft = Draft::from_version(version);
                next.tab = Tab::Editor;
                next.rebind();
            }
            Action::TabSelected(Tab::History) if next.history.is_new() => {
                return Err(PromptError::Validation(
                    "save the prompt before opening its history".to_string(),
                ));
            }
            Action::TabSelected(tab) => next.tab = tab,
            Action::CompareRequested(version_id) => {
                next.comparison = Some(next.history.compare(version_id)?);
            }
            Action::ComparisonClosed => next.comparison = None,
            Action::RunStarted => next.execution = self.execution.start()?,
            Action::RunFinished(outcome) => next.execution = self.execution.finish(outcome)?,
            Action::ResultDismissed => next.execution = self.execution.dismiss(),
            Action::ReadOnlySet(read_only) => next.read_only = read_only,
        }

        Ok(next)
    }

    fn rebind(&mut self) {
        let names = TemplateEngine::new().extract_variables(&self.draft.template);
        self.bindings = self.bindings.reconcile(&names);
        debug!("Bindings now cover {} variables", self.bindings.len());
    }

    pub fn ensure_editable(&self) -> Result<()> {
        if self.read_only {
            return Err(PromptError::Validation(
                "the prompt is open read-only".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether the draft can amend a persisted version in place
    pub fn can_amend(&self) -> bool {
        !self.history.is_new() && self.draft.version_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::ModelConfig;
    use crate::provider::Model;
    use crate::version::VersionDraft;

    fn fresh() -> EditorState {
        EditorState::new(
            VersionStore::new(PromptMeta::named("greeting")),
            ProviderDirectory::new(Vec::new(), vec!["openai".to_string()]),
            ProviderSelection::legacy("openai", "gpt-3.5-turbo"),
        )
    }

    fn record_with(templates: &[&str], active: Option<usize>) -> PromptRecord {
        let mut store = VersionStore::new(PromptMeta::named("greeting"));
        store.assign_id(7);
        for template in templates {
            store
                .append(VersionDraft {
                    template: template.to_string(),
                    model_config: ModelConfig::default(),
                    commit_message: "msg".to_string(),
                    input_variables: Vec::new(),
                })
                .unwrap();
        }
        if let Some(index) = active {
            let id = store.versions()[index].id;
            store.activate(id).unwrap();
        }
        store.to_record().unwrap()
    }

    fn loaded(templates: &[&str], active: Option<usize>) -> EditorState {
        let (state, ticket) = fresh().issue_fetch(FetchKind::Prompt);
        state
            .apply(Action::PromptLoaded {
                ticket,
                record: record_with(templates, active),
            })
            .unwrap()
    }

    #[test]
    fn test_template_edit_reconciles_bindings() {
        let state = fresh()
            .apply(Action::TemplateEdited("Hi {{name}}".to_string()))
            .unwrap()
            .apply(Action::VariableSet {
                name: "name".to_string(),
                value: "Alice".to_string(),
            })
            .unwrap()
            .apply(Action::TemplateEdited("Hi {{name}}, order {{id}}".to_string()))
            .unwrap();

        let pairs: Vec<_> = state.bindings.iter().collect();
        assert_eq!(pairs, vec![("name", "Alice"), ("id", "")]);
    }

    #[test]
    fn test_apply_does_not_mutate_original() {
        let original = fresh();
        let edited = original
            .apply(Action::TemplateEdited("{{x}}".to_string()))
            .unwrap();
        assert!(original.draft.template.is_empty());
        assert_eq!(edited.bindings.names(), vec!["x"]);
    }

    #[test]
    fn test_unknown_variable_is_rejected() {
        let err = fresh()
            .apply(Action::VariableSet {
                name: "missing".to_string(),
                value: "x".to_string(),
            })
            .unwrap_err();
        assert!(matches!(err, PromptError::Validation(_)));
    }

    #[test]
    fn test_prompt_load_uses_active_version() {
        let state = loaded(&["one {{a}}", "two {{b}}", "three"], Some(1));
        assert_eq!(state.draft.template, "two {{b}}");
        assert_eq!(state.draft.version_number, Some(2));
        assert_eq!(state.bindings.names(), vec!["b"]);
        assert!(state.can_amend());
    }

    #[test]
    fn test_prompt_load_falls_back_to_latest() {
        let state = loaded(&["one", "two"], None);
        assert_eq!(state.draft.version_number, Some(2));
    }

    #[test]
    fn test_loading_prompt_without_versions_clears_draft() {
        let state = loaded(&["A {{x}}"], None);
        assert!(state.can_amend());

        let (state, ticket) = state.issue_fetch(FetchKind::Prompt);
        let mut empty = record_with(&[], None);
        empty.id = 8;
        let state = state
            .apply(Action::PromptLoaded { ticket, record: empty })
            .unwrap();

        assert_eq!(state.draft, Draft::default());
        assert!(state.bindings.is_empty());
        assert!(!state.can_amend());
    }

    #[test]
    fn test_read_only_rejects_edits_but_allows_runs() {
        let state = loaded(&["Hi {{name}}"], None)
            .apply(Action::ReadOnlySet(true))
            .unwrap();

        for action in [
            Action::TemplateEdited("changed".to_string()),
            Action::ConfigEdited("{\"temperature\": 1}".to_string()),
            Action::MetaEdited(PromptMeta::named("renamed")),
        ] {
            assert!(matches!(state.apply(action), Err(PromptError::Validation(_))));
        }
        assert!(state.ensure_editable().is_err());

        let state = state
            .apply(Action::VariableSet {
                name: "name".to_string(),
                value: "Alice".to_string(),
            })
            .unwrap()
            .apply(Action::RunStarted)
            .unwrap();
        assert!(state.execution.is_running());
        assert_eq!(state.draft.template, "Hi {{name}}");

        let editable = state.apply(Action::ReadOnlySet(false)).unwrap();
        assert!(editable.apply(Action::TemplateEdited("ok".to_string())).is_ok());
    }

    #[test]
    fn test_stale_prompt_response_is_discarded() {
        let (state, first) = fresh().issue_fetch(FetchKind::Prompt);
        let (state, second) = state.issue_fetch(FetchKind::Prompt);

        let state = state
            .apply(Action::PromptLoaded {
                ticket: second,
                record: record_with(&["newer"], None),
            })
            .unwrap();
        let state = state
            .apply(Action::PromptLoaded {
                ticket: first,
                record: record_with(&["older", "older still"], None),
            })
            .unwrap();

        assert_eq!(state.draft.template, "newer");
        assert_eq!(state.history.versions().len(), 1);
    }

    #[test]
    fn test_providers_load_picks_first_when_unchosen() {
        let (state, ticket) = fresh().issue_fetch(FetchKind::Providers);
        let providers = vec![Provider {
            id: 3,
            name: "OpenAI".to_string(),
            api_key: None,
            base_url: None,
            models: vec![Model { id: 1, name: "gpt-4o".to_string() }],
        }];

        let state = state
            .apply(Action::ProvidersLoaded { ticket, providers: providers.clone() })
            .unwrap();
        assert_eq!(state.selection.provider, ProviderRef::Configured(3));
        assert_eq!(state.selection.model_name, "gpt-4o");

        let chosen = fresh()
            .apply(Action::ProviderSelected(ProviderRef::Legacy("gemini".to_string())))
            .unwrap();
        let (chosen, ticket) = chosen.issue_fetch(FetchKind::Providers);
        let chosen = chosen
            .apply(Action::ProvidersLoaded { ticket, providers })
            .unwrap();
        assert_eq!(chosen.selection.provider, ProviderRef::Legacy("gemini".to_string()));
    }

    #[test]
    fn test_load_version_switches_to_editor() {
        let state = loaded(&["one {{a}}", "two"], None)
            .apply(Action::TabSelected(Tab::History))
            .unwrap();
        let first = state.history.versions()[0].id;

        let state = state.apply(Action::VersionLoaded(first)).unwrap();
        assert_eq!(state.tab, Tab::Editor);
        assert_eq!(state.draft.template, "one {{a}}");
        assert_eq!(state.bindings.names(), vec!["a"]);
    }

    #[test]
    fn test_history_tab_requires_saved_prompt() {
        assert!(fresh().apply(Action::TabSelected(Tab::History)).is_err());
    }

    #[test]
    fn test_comparison() {
        let state = loaded(&["one", "two", "three"], None);
        let third = state.history.versions()[2].id;

        let state = state.apply(Action::CompareRequested(third)).unwrap();
        let comparison = state.comparison.as_ref().unwrap();
        assert_eq!(comparison.older.template, "two");
        assert_eq!(comparison.newer.template, "three");

        let state = state.apply(Action::ComparisonClosed).unwrap();
        assert!(state.comparison.is_none());

        let first = state.history.versions()[0].id;
        assert!(state.apply(Action::CompareRequested(first)).is_err());
    }

    #[test]
    fn test_single_run_at_a_time() {
        let running = fresh().apply(Action::RunStarted).unwrap();
        assert!(matches!(
            running.apply(Action::RunStarted),
            Err(PromptError::ExecutionInProgress)
        ));

        let done = running
            .apply(Action::RunFinished(Ok("generated".to_string())))
            .unwrap();
        assert_eq!(
            done.execution,
            ExecutionPhase::Succeeded { response: "generated".to_string() }
        );
        let idle = done.apply(Action::ResultDismissed).unwrap();
        assert_eq!(idle.execution, ExecutionPhase::Idle);
    }
}
