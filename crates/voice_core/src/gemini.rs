//! Boundary to the hosted conversational model.
//!
//! Default endpoint: https://generativelanguage.googleapis.com/v1beta

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};
use url::Url;

use crate::{dispatcher::FunctionCall, error::VoiceError, schema::FunctionDeclaration};

pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReplyPart {
    Text(String),
    FunctionCall(FunctionCall),
    /// Only sent back in history, after the matching call ran.
    FunctionResponse { name: String, response: Value },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub role: Role,
    pub parts: Vec<ReplyPart>,
}

impl Message {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![ReplyPart::Text(text.into())],
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GenerationOptions {
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub history: Vec<Message>,
    pub system_instruction: String,
    pub functions: Vec<FunctionDeclaration>,
    pub options: GenerationOptions,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelReply {
    pub parts: Vec<ReplyPart>,
}

#[async_trait]
pub trait ConversationalApi: Send + Sync {
    async fn generate(&self, request: ModelRequest) -> Result<ModelReply, VoiceError>;
}

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub endpoint: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: Some(0.7),
            max_output_tokens: Some(1024),
        }
    }
}

impl GeminiConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads `GEMINI_API_KEY`, `GEMINI_ENDPOINT` and `GEMINI_MODEL`. Blank or
    /// unparsable values keep the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let present = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        config.api_key = present("GEMINI_API_KEY");
        if let Some(raw) = present("GEMINI_ENDPOINT") {
            match Url::parse(&raw) {
                Ok(_) => config.endpoint = raw,
                Err(error) => warn!(%error, value = %raw, "invalid GEMINI_ENDPOINT; using default"),
            }
        }
        if let Some(model) = present("GEMINI_MODEL") {
            config.model = model;
        }
        config
    }

    fn options(&self) -> GenerationOptions {
        GenerationOptions {
            temperature: self.temperature,
            max_output_tokens: self.max_output_tokens,
        }
    }
}

pub struct GeminiClient {
    http: Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self, VoiceError> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    /// Generation options from the config, for callers building requests.
    pub fn default_options(&self) -> GenerationOptions {
        self.config.options()
    }

    fn generate_url(&self, api_key: &str) -> Result<Url, VoiceError> {
        let mut url = Url::parse(&self.config.endpoint).map_err(|error| {
            VoiceError::ExternalApi(format!("invalid endpoint {}: {error}", self.config.endpoint))
        })?;
        url.path_segments_mut()
            .map_err(|()| {
                VoiceError::ExternalApi(format!("endpoint {} cannot take a path", self.config.endpoint))
            })?
            .pop_if_empty()
            .push("models")
            .push(&format!("{}:generateContent", self.config.model));
        url.query_pairs_mut().append_pair("key", api_key);
        Ok(url)
    }
}

#[async_trait]
impl ConversationalApi for GeminiClient {
    async fn generate(&self, request: ModelRequest) -> Result<ModelReply, VoiceError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(VoiceError::NotInitialized("conversational api key"))?;
        let url = self.generate_url(api_key)?;
        let body = GenerateContentRequest::from(request);
        debug!(model = %self.config.model, contents = body.contents.len(), "sending generateContent");

        let response = self.http.post(url).json(&body).send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let detail = serde_json::from_str::<GenerateContentResponse>(&text)
                .ok()
                .and_then(|parsed| parsed.error)
                .map(|error| error.message)
                .unwrap_or(text);
            return Err(VoiceError::ExternalApi(format!("{status}: {detail}")));
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&text)
            .map_err(|error| VoiceError::ExternalApi(format!("malformed response: {error}")))?;
        let candidate = parsed
            .candidates
            .unwrap_or_default()
            .into_iter()
            .next()
            .ok_or_else(|| VoiceError::ExternalApi("response contained no candidates".into()))?;

        let parts = candidate
            .content
            .map(|content| content.parts)
            .unwrap_or_default()
            .into_iter()
            .filter_map(WirePart::into_reply_part)
            .collect();
        Ok(ModelReply { parts })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<WireContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<WireContent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<WireGenerationConfig>,
}

impl From<ModelRequest> for GenerateContentRequest {
    fn from(request: ModelRequest) -> Self {
        let system_instruction = (!request.system_instruction.is_empty()).then(|| WireContent {
            role: None,
            parts: vec![WirePart::text(request.system_instruction)],
        });
        let tools = if request.functions.is_empty() {
            Vec::new()
        } else {
            vec![WireTool {
                function_declarations: request.functions,
            }]
        };
        let options = request.options;
        let generation_config = (options.temperature.is_some()
            || options.max_output_tokens.is_some())
        .then_some(WireGenerationConfig {
            temperature: options.temperature,
            max_output_tokens: options.max_output_tokens,
        });

        Self {
            contents: request.history.into_iter().map(WireContent::from).collect(),
            system_instruction,
            tools,
            generation_config,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<Role>,
    #[serde(default)]
    parts: Vec<WirePart>,
}

impl From<Message> for WireContent {
    fn from(message: Message) -> Self {
        Self {
            role: Some(message.role),
            parts: message.parts.into_iter().map(WirePart::from).collect(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<WireFunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<WireFunctionResponse>,
}

impl WirePart {
    fn text(text: String) -> Self {
        Self {
            text: Some(text),
            ..Self::default()
        }
    }

    fn into_reply_part(self) -> Option<ReplyPart> {
        if let Some(call) = self.function_call {
            let args = match call.args {
                Value::Object(map) => map,
                _ => Map::new(),
            };
            return Some(ReplyPart::FunctionCall(FunctionCall {
                name: call.name,
                args,
            }));
        }
        self.text
            .filter(|text| !text.trim().is_empty())
            .map(ReplyPart::Text)
    }
}

impl From<ReplyPart> for WirePart {
    fn from(part: ReplyPart) -> Self {
        match part {
            ReplyPart::Text(text) => Self::text(text),
            ReplyPart::FunctionCall(call) => Self {
                function_call: Some(WireFunctionCall {
                    name: call.name,
                    args: Value::Object(call.args),
                }),
                ..Self::default()
            },
            ReplyPart::FunctionResponse { name, response } => Self {
                function_response: Some(WireFunctionResponse { name, response }),
                ..Self::default()
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionResponse {
    name: String,
    response: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireTool {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Option<Vec<WireCandidate>>,
    #[serde(default)]
    error: Option<WireError>,
}

#[derive(Debug, Deserialize)]
struct WireCandidate {
    #[serde(default)]
    content: Option<WireContent>,
}

#[derive(Debug, Deserialize)]
struct WireError {
    message: String,
}

#[cfg(test)]
#[path = "tests/gemini_tests.rs"]
mod tests;
