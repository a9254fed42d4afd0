use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RfqId(pub Uuid);

impl RfqId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for RfqId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Number of steps in the RFQ creation wizard.
pub const WIZARD_STEPS: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RfqStatus {
    Draft,
    InProgress,
    Submitted,
    Quoted,
    Closed,
}

impl RfqStatus {
    pub const ALL: [RfqStatus; 5] = [
        RfqStatus::Draft,
        RfqStatus::InProgress,
        RfqStatus::Submitted,
        RfqStatus::Quoted,
        RfqStatus::Closed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RfqStatus::Draft => "draft",
            RfqStatus::InProgress => "in_progress",
            RfqStatus::Submitted => "submitted",
            RfqStatus::Quoted => "quoted",
            RfqStatus::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommercialTerms {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lead_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_terms: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incoterms: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rfq {
    pub id: RfqId,
    pub user_id: UserId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: RfqStatus,
    pub current_step: u8,
    #[serde(default)]
    pub completed_steps: Vec<u8>,
    #[serde(default)]
    pub commercial_terms: CommercialTerms,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Uploading,
    Uploaded,
    Processing,
    Analyzed,
    Error,
}

/// A file the user attached to the RFQ being assembled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub size: u64,
    pub uploaded_at: DateTime<Utc>,
    pub status: FileStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_result: Option<serde_json::Value>,
}
