//! Voice-function registry, dispatcher and conversational loop.

pub mod assistant;
pub mod bridge;
pub mod dispatcher;
pub mod error;
pub mod functions;
pub mod gemini;
pub mod registry;
pub mod schema;
pub mod state;
pub mod turn;

pub use assistant::{AssistantReply, DispatchedCall, VoiceAssistant, FALLBACK_REPLY};
pub use bridge::{Bridge, CommercialTerm, Severity, UiBridge};
pub use dispatcher::{Dispatcher, FunctionCall};
pub use error::{PermissionCause, VoiceError};
pub use functions::VoiceCommand;
pub use gemini::{ConversationalApi, GeminiClient, GeminiConfig, ModelReply, ModelRequest, ReplyPart};
pub use registry::{FnHandler, FunctionDefinition, FunctionHandler, FunctionRegistry, FunctionResult, HandlerContext};
pub use schema::{FunctionDeclaration, ParameterSchema, PropertySchema};
pub use state::{ConversationState, StateAction, View};
pub use turn::{TurnEffect, TurnEvent, TurnMachine, TurnState};

#[cfg(test)]
#[path = "tests/support.rs"]
mod tests_support;
