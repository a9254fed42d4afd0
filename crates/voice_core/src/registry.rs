use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    bridge::Bridge,
    functions,
    schema::{FunctionDeclaration, ParameterSchema},
    state::{ConversationState, StateAction},
};

/// What a handler reports back; the dispatcher returns it untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionResult {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub requires_files: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub requires_confirmation: bool,
}

impl FunctionResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
            requires_files: false,
            requires_confirmation: false,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            ..Self::ok(message)
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn requiring_files(mut self) -> Self {
        self.requires_files = true;
        self
    }

    pub fn requiring_confirmation(mut self) -> Self {
        self.requires_confirmation = true;
        self
    }
}

pub struct HandlerContext<'a> {
    pub state: &'a mut ConversationState,
    pub bridge: &'a Bridge,
}

#[async_trait]
pub trait FunctionHandler: Send + Sync {
    async fn call(
        &self,
        ctx: HandlerContext<'_>,
        args: &Map<String, Value>,
    ) -> anyhow::Result<FunctionResult>;
}

/// Adapts a synchronous closure into a [`FunctionHandler`].
pub struct FnHandler<F>(F);

impl<F> FnHandler<F>
where
    F: Fn(HandlerContext<'_>, &Map<String, Value>) -> anyhow::Result<FunctionResult> + Send + Sync,
{
    pub fn new(handler: F) -> Self {
        Self(handler)
    }
}

#[async_trait]
impl<F> FunctionHandler for FnHandler<F>
where
    F: Fn(HandlerContext<'_>, &Map<String, Value>) -> anyhow::Result<FunctionResult> + Send + Sync,
{
    async fn call(
        &self,
        ctx: HandlerContext<'_>,
        args: &Map<String, Value>,
    ) -> anyhow::Result<FunctionResult> {
        (self.0)(ctx, args)
    }
}

#[derive(Clone)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: ParameterSchema,
    pub handler: Arc<dyn FunctionHandler>,
}

impl FunctionDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ParameterSchema,
        handler: impl FunctionHandler + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            handler: Arc::new(handler),
        }
    }

    pub fn declaration(&self) -> FunctionDeclaration {
        FunctionDeclaration {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters.to_json(),
        }
    }
}

impl std::fmt::Debug for FunctionDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionDefinition")
            .field("name", &self.name)
            .field("required", &self.parameters.required())
            .finish_non_exhaustive()
    }
}

/// Invokable voice functions plus the conversation state they act on.
#[derive(Debug, Default)]
pub struct FunctionRegistry {
    definitions: Vec<FunctionDefinition>,
    index: HashMap<String, usize>,
    state: ConversationState,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtin_functions() -> Self {
        let mut registry = Self::new();
        functions::register_builtins(&mut registry);
        registry
    }

    /// Re-registering a name replaces the earlier definition in its original
    /// position.
    pub fn register(&mut self, definition: FunctionDefinition) {
        match self.index.get(&definition.name) {
            Some(&slot) => self.definitions[slot] = definition,
            None => {
                self.index
                    .insert(definition.name.clone(), self.definitions.len());
                self.definitions.push(definition);
            }
        }
    }

    /// Registration order.
    pub fn list(&self) -> &[FunctionDefinition] {
        &self.definitions
    }

    pub fn get(&self, name: &str) -> Option<&FunctionDefinition> {
        self.index.get(name).map(|&slot| &self.definitions[slot])
    }

    pub fn declarations(&self) -> Vec<FunctionDeclaration> {
        self.definitions
            .iter()
            .map(FunctionDefinition::declaration)
            .collect()
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ConversationState {
        &mut self.state
    }

    pub fn update_state(&mut self, action: StateAction) {
        self.state.apply(action);
    }

    pub fn reset_state(&mut self) {
        self.state = ConversationState::default();
    }
}

#[cfg(test)]
#[path = "tests/registry_tests.rs"]
mod tests;
