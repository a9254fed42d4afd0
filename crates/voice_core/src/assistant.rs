use serde_json::json;
use tracing::{error, info, warn};

use crate::{
    bridge::Severity,
    dispatcher::Dispatcher,
    error::{PermissionCause, VoiceError},
    gemini::{ConversationalApi, GenerationOptions, Message, ModelRequest, ReplyPart, Role},
    registry::FunctionResult,
    turn::{TurnEvent, TurnMachine, TurnState},
};

pub const FALLBACK_REPLY: &str = "Sorry, I encountered an error processing your request.";

/// Messages kept for the next model request.
pub const HISTORY_LIMIT: usize = 40;

/// Outcome of one dispatched function call within a turn.
#[derive(Debug)]
pub struct DispatchedCall {
    pub name: String,
    pub outcome: Result<FunctionResult, VoiceError>,
}

#[derive(Debug, Default)]
pub struct AssistantReply {
    /// What should be spoken back; empty when there is nothing to say.
    pub spoken: String,
    pub calls: Vec<DispatchedCall>,
    /// True when the model could not be reached and `spoken` is the fallback.
    pub fallback: bool,
}

/// Runs utterances through the conversational model and the dispatcher.
pub struct VoiceAssistant<A: ConversationalApi> {
    api: A,
    dispatcher: Dispatcher,
    turn: TurnMachine,
    history: Vec<Message>,
    options: GenerationOptions,
}

impl<A: ConversationalApi> VoiceAssistant<A> {
    pub fn new(api: A, dispatcher: Dispatcher) -> Self {
        Self {
            api,
            dispatcher,
            turn: TurnMachine::new(),
            history: Vec::new(),
            options: GenerationOptions::default(),
        }
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher {
        &mut self.dispatcher
    }

    pub fn turn_state(&self) -> TurnState {
        self.turn.state()
    }

    pub fn turn(&mut self) -> &mut TurnMachine {
        &mut self.turn
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn system_prompt(&self) -> String {
        let state = self.dispatcher.state();
        let mut prompt = String::from(
            "You are Robbie, a voice assistant that helps buyers prepare requests for quotation (RFQs). \
             Keep spoken answers short. When the user asks for something one of the functions below can do, \
             call the function instead of describing it.\n\nAvailable functions, in priority order:\n",
        );
        for (position, definition) in self.dispatcher.registry().list().iter().enumerate() {
            prompt.push_str(&format!(
                "{}. {}: {}\n",
                position + 1,
                definition.name,
                definition.description
            ));
        }
        prompt.push_str(&format!(
            "\nThe user is on {}, wizard step {}, with {} uploaded file(s).",
            state.current_view.label(),
            state.current_step,
            state.uploaded_files.len()
        ));
        prompt
    }

    /// Handles one complete text utterance. The turn ends in `Speaking` when
    /// there is something to say; call [`Self::speech_finished`] once it has
    /// been played.
    pub async fn handle_utterance(&mut self, text: &str) -> Result<AssistantReply, VoiceError> {
        if self.turn.is_errored() {
            return Err(VoiceError::NotInitialized("conversational api"));
        }
        if matches!(self.turn.state(), TurnState::Idle | TurnState::Speaking) {
            self.turn.handle(TurnEvent::Activate);
        }
        self.turn.handle(TurnEvent::EndOfInput);

        self.history.push(Message::user_text(text));
        let request = ModelRequest {
            history: self.history.clone(),
            system_instruction: self.system_prompt(),
            functions: self.dispatcher.registry().declarations(),
            options: self.options,
        };

        let reply = match self.api.generate(request).await {
            Ok(reply) => reply,
            Err(err) => {
                error!(error = %err, "conversational api request failed");
                // Drop the unanswered utterance so history stays well formed.
                self.history.pop();
                if matches!(err, VoiceError::NotInitialized(_)) {
                    self.turn.handle(TurnEvent::InitFailed);
                } else {
                    self.turn.handle(TurnEvent::ResponseReceived { spoken: true });
                }
                return Ok(AssistantReply {
                    spoken: FALLBACK_REPLY.to_string(),
                    calls: Vec::new(),
                    fallback: true,
                });
            }
        };

        let mut texts = Vec::new();
        let mut call_messages = Vec::new();
        let mut calls = Vec::new();
        let mut responses = Vec::new();

        for part in &reply.parts {
            match part {
                ReplyPart::Text(text) => texts.push(text.trim().to_string()),
                ReplyPart::FunctionCall(call) => {
                    let outcome = self.dispatcher.dispatch_call(call.clone()).await;
                    let response = match &outcome {
                        Ok(result) => {
                            call_messages.push(result.message.clone());
                            serde_json::to_value(result).unwrap_or_else(|_| json!({}))
                        }
                        Err(err) => {
                            warn!(function = %call.name, error = %err, "voice function call failed");
                            call_messages.push(err.to_string());
                            json!({ "success": false, "error": err.to_string() })
                        }
                    };
                    responses.push(ReplyPart::FunctionResponse {
                        name: call.name.clone(),
                        response,
                    });
                    calls.push(DispatchedCall {
                        name: call.name.clone(),
                        outcome,
                    });
                }
                ReplyPart::FunctionResponse { .. } => {}
            }
        }

        let model_parts: Vec<ReplyPart> = reply
            .parts
            .into_iter()
            .filter(|part| !matches!(part, ReplyPart::FunctionResponse { .. }))
            .collect();
        if model_parts.is_empty() {
            // The API rejects history containing a model turn without parts.
            warn!("conversational api returned an empty reply");
            self.history.pop();
        } else {
            self.history.push(Message {
                role: Role::Model,
                parts: model_parts,
            });
        }
        if !responses.is_empty() {
            self.history.push(Message {
                role: Role::User,
                parts: responses,
            });
        }
        self.trim_history();

        let spoken = if texts.is_empty() {
            call_messages.join(" ")
        } else {
            texts.join(" ")
        };
        self.turn.handle(TurnEvent::ResponseReceived {
            spoken: !spoken.is_empty(),
        });
        info!(calls = calls.len(), "voice turn handled");

        Ok(AssistantReply {
            spoken,
            calls,
            fallback: false,
        })
    }

    pub fn speech_finished(&mut self) {
        self.turn.handle(TurnEvent::SpeechFinished);
    }

    pub fn stop(&mut self) {
        self.turn.handle(TurnEvent::Stop);
    }

    /// Clears the error flag left by a failed initialization and forgets the
    /// conversation history.
    pub fn reinitialize(&mut self) {
        self.history.clear();
        self.turn.handle(TurnEvent::Reinitialize);
    }

    /// Microphone capture failed: one error toast, and the turn goes back to
    /// idle.
    pub fn report_permission_error(&mut self, cause: PermissionCause) -> Result<(), VoiceError> {
        warn!(?cause, "voice capture unavailable");
        self.turn.handle(TurnEvent::CaptureFailed);
        self.dispatcher
            .bridge()
            .get()?
            .show_notification(cause.user_message(), Severity::Error);
        Ok(())
    }

    /// Drops whole exchanges from the front so history always opens with a
    /// plain user utterance.
    fn trim_history(&mut self) {
        if self.history.len() <= HISTORY_LIMIT {
            return;
        }
        let mut start = self.history.len() - HISTORY_LIMIT;
        while start < self.history.len() && !opens_exchange(&self.history[start]) {
            start += 1;
        }
        self.history.drain(..start);
    }
}

fn opens_exchange(message: &Message) -> bool {
    message.role == Role::User
        && message
            .parts
            .iter()
            .all(|part| matches!(part, ReplyPart::Text(_)))
}

#[cfg(test)]
#[path = "tests/assistant_tests.rs"]
mod tests;
