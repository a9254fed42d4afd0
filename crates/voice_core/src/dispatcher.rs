use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::{
    bridge::{Bridge, UiBridge},
    error::VoiceError,
    registry::{FunctionRegistry, FunctionResult, HandlerContext},
    state::{ContextEntry, ConversationState},
};

/// A structured call decoded from a model reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

/// Validates and runs named function calls against a [`FunctionRegistry`].
///
/// Calls are not queued: overlapping callers that share one dispatcher (for
/// example behind a mutex) see last-write-wins on `last_action` and
/// `current_step`.
#[derive(Debug)]
pub struct Dispatcher {
    registry: FunctionRegistry,
    bridge: Bridge,
}

impl Dispatcher {
    pub fn new(registry: FunctionRegistry) -> Self {
        Self {
            registry,
            bridge: Bridge::uninitialized(),
        }
    }

    pub fn initialize(&mut self, bridge: Arc<dyn UiBridge>) {
        info!(
            functions = self.registry.list().len(),
            "voice dispatcher initialized"
        );
        self.bridge = Bridge::new(bridge);
    }

    /// Drops the bridge and forgets the conversation.
    pub fn dispose(&mut self) {
        self.bridge = Bridge::uninitialized();
        self.registry.reset_state();
        info!("voice dispatcher disposed");
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut FunctionRegistry {
        &mut self.registry
    }

    pub fn state(&self) -> &ConversationState {
        self.registry.state()
    }

    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    pub async fn dispatch_call(&mut self, call: FunctionCall) -> Result<FunctionResult, VoiceError> {
        self.execute(&call.name, call.args).await
    }

    /// Runs `name` with `args`. Context bookkeeping is written before this
    /// returns, whether the handler succeeded or failed.
    pub async fn execute(
        &mut self,
        name: &str,
        args: Map<String, Value>,
    ) -> Result<FunctionResult, VoiceError> {
        let definition = self
            .registry
            .get(name)
            .ok_or_else(|| VoiceError::NotFound(name.to_string()))?;

        if let Some(field) = definition.parameters.first_missing(&args) {
            return Err(VoiceError::Validation {
                function: name.to_string(),
                field: field.to_string(),
            });
        }

        let handler = Arc::clone(&definition.handler);
        debug!(function = name, "dispatching voice function");

        let outcome = handler
            .call(
                HandlerContext {
                    state: self.registry.state_mut(),
                    bridge: &self.bridge,
                },
                &args,
            )
            .await;

        let state = self.registry.state_mut();
        state.last_action = Some(name.to_string());
        let (result, error) = match &outcome {
            Ok(result) => (serde_json::to_value(result).ok(), None),
            Err(error) => (None, Some(format!("{error:#}"))),
        };
        state.context.insert(
            name,
            ContextEntry {
                parameters: Value::Object(args),
                result,
                error,
                timestamp: Utc::now(),
            },
        );

        outcome.map_err(|source| {
            warn!(function = name, error = %source, "voice function failed");
            // Typed voice errors raised inside a handler (an uninitialized
            // bridge, for one) surface as themselves.
            match source.downcast::<VoiceError>() {
                Ok(voice_error) => voice_error,
                Err(source) => VoiceError::Handler {
                    function: name.to_string(),
                    source,
                },
            }
        })
    }
}

#[cfg(test)]
#[path = "tests/dispatcher_tests.rs"]
mod tests;
