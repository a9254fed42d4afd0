use std::sync::Arc;

use serde::{Deserialize, Serialize};
use shared::domain::UploadedFile;

use crate::{error::VoiceError, state::View};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommercialTerm {
    LeadTime,
    PaymentTerms,
    Incoterms,
}

impl CommercialTerm {
    pub fn label(self) -> &'static str {
        match self {
            CommercialTerm::LeadTime => "lead time",
            CommercialTerm::PaymentTerms => "payment terms",
            CommercialTerm::Incoterms => "incoterms",
        }
    }
}

/// Capabilities the presentation layer lends to voice-function handlers.
///
/// Every slot is synchronous and fire-and-forget. Handlers reach UI state only
/// through this trait.
pub trait UiBridge: Send + Sync {
    fn set_show_upload_form(&self, visible: bool);
    fn set_current_step(&self, step: u8);
    fn navigate_to(&self, view: View);
    fn update_files(&self, files: &[UploadedFile]);
    fn show_notification(&self, message: &str, severity: Severity);
    fn set_show_system_info(&self, visible: bool);
    /// `None` closes the feature-detail panel.
    fn set_detail_panel(&self, feature_id: Option<&str>);

    /// Optional field-level setter; presentation layers without a
    /// commercial-terms form can ignore it.
    fn set_commercial_term(&self, _term: CommercialTerm, _value: &str) {}
}

/// Slot holding the bridge once the presentation layer has supplied it.
#[derive(Clone, Default)]
pub struct Bridge {
    inner: Option<Arc<dyn UiBridge>>,
}

impl Bridge {
    pub fn uninitialized() -> Self {
        Self::default()
    }

    pub fn new(bridge: Arc<dyn UiBridge>) -> Self {
        Self {
            inner: Some(bridge),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.is_some()
    }

    pub fn get(&self) -> Result<&dyn UiBridge, VoiceError> {
        self.inner
            .as_deref()
            .ok_or(VoiceError::NotInitialized("ui bridge"))
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("initialized", &self.is_initialized())
            .finish()
    }
}
