use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::domain::UploadedFile;

/// Distinct action names remembered in [`ConversationState::context`].
pub const CONTEXT_CAPACITY: usize = 64;

/// Top-level screens of the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum View {
    #[default]
    Dashboard,
    RfqWizard,
    RfqList,
    Analytics,
    Settings,
}

impl View {
    pub const ALL: [View; 5] = [
        View::Dashboard,
        View::RfqWizard,
        View::RfqList,
        View::Analytics,
        View::Settings,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            View::Dashboard => "dashboard",
            View::RfqWizard => "rfq_wizard",
            View::RfqList => "rfq_list",
            View::Analytics => "analytics",
            View::Settings => "settings",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            View::Dashboard => "the dashboard",
            View::RfqWizard => "the RFQ wizard",
            View::RfqList => "your RFQ list",
            View::Analytics => "analytics",
            View::Settings => "settings",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        View::ALL
            .into_iter()
            .find(|view| view.as_str() == normalized)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub parameters: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Keyed history of recent actions, bounded to `capacity` keys.
///
/// Writing a key marks it most recent; inserting a new key past capacity
/// evicts the least recently written one.
#[derive(Debug, Clone)]
pub struct ActionContext {
    capacity: usize,
    entries: HashMap<String, ContextEntry>,
    order: VecDeque<String>,
}

impl ActionContext {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, entry: ContextEntry) {
        let key = key.into();
        if self.entries.insert(key.clone(), entry).is_some() {
            self.order.retain(|existing| existing != &key);
        }
        self.order.push_back(key);

        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.entries.remove(&evicted);
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&ContextEntry> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys from least to most recently written.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

impl Default for ActionContext {
    fn default() -> Self {
        Self::with_capacity(CONTEXT_CAPACITY)
    }
}

#[derive(Debug, Clone)]
pub struct ConversationState {
    pub uploaded_files: Vec<UploadedFile>,
    pub current_view: View,
    pub current_step: u8,
    pub active_analysis: Option<Value>,
    pub last_action: Option<String>,
    pub context: ActionContext,
}

impl Default for ConversationState {
    fn default() -> Self {
        Self {
            uploaded_files: Vec::new(),
            current_view: View::default(),
            current_step: 1,
            active_analysis: None,
            last_action: None,
            context: ActionContext::default(),
        }
    }
}

impl ConversationState {
    /// Replaces the entry with the same id in place, otherwise appends.
    pub fn upsert_file(&mut self, file: UploadedFile) {
        match self
            .uploaded_files
            .iter_mut()
            .find(|existing| existing.id == file.id)
        {
            Some(existing) => *existing = file,
            None => self.uploaded_files.push(file),
        }
    }

    pub fn apply(&mut self, action: StateAction) {
        match action {
            StateAction::FileUploaded(file) => self.upsert_file(file),
            StateAction::FilesReplaced(files) => self.uploaded_files = files,
            StateAction::Navigated(view) => self.current_view = view,
            StateAction::StepChanged(step) => self.current_step = step,
            StateAction::AnalysisComplete(analysis) => self.active_analysis = Some(analysis),
            StateAction::Custom { tag, payload } => self.context.insert(
                tag,
                ContextEntry {
                    parameters: payload,
                    result: None,
                    error: None,
                    timestamp: Utc::now(),
                },
            ),
        }
    }
}

/// Tagged updates accepted by [`ConversationState::apply`].
#[derive(Debug, Clone, PartialEq)]
pub enum StateAction {
    FileUploaded(UploadedFile),
    FilesReplaced(Vec<UploadedFile>),
    Navigated(View),
    StepChanged(u8),
    AnalysisComplete(Value),
    Custom { tag: String, payload: Value },
}

#[cfg(test)]
#[path = "tests/state_tests.rs"]
mod tests;
