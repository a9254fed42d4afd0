use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use shared::domain::{FileStatus, UploadedFile};
use voice_core::{
    state::CONTEXT_CAPACITY, CommercialTerm, ConversationalApi, Dispatcher, FnHandler,
    FunctionCall, FunctionDefinition, FunctionRegistry, FunctionResult, ModelReply, ModelRequest,
    ParameterSchema, PropertySchema, ReplyPart, Severity, StateAction, TurnState, UiBridge, View,
    VoiceAssistant, VoiceError,
};

#[derive(Default)]
struct Screen {
    view: Mutex<Option<View>>,
    step: Mutex<Option<u8>>,
    files: Mutex<Vec<String>>,
    toasts: Mutex<Vec<(String, Severity)>>,
    terms: Mutex<Vec<(CommercialTerm, String)>>,
}

impl UiBridge for Screen {
    fn set_show_upload_form(&self, _visible: bool) {}

    fn set_current_step(&self, step: u8) {
        *self.step.lock().unwrap() = Some(step);
    }

    fn navigate_to(&self, view: View) {
        *self.view.lock().unwrap() = Some(view);
    }

    fn update_files(&self, files: &[UploadedFile]) {
        *self.files.lock().unwrap() = files.iter().map(|f| f.name.clone()).collect();
    }

    fn show_notification(&self, message: &str, severity: Severity) {
        self.toasts
            .lock()
            .unwrap()
            .push((message.to_string(), severity));
    }

    fn set_show_system_info(&self, _visible: bool) {}

    fn set_detail_panel(&self, _feature_id: Option<&str>) {}

    fn set_commercial_term(&self, term: CommercialTerm, value: &str) {
        self.terms.lock().unwrap().push((term, value.to_string()));
    }
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("not an object: {other}"),
    }
}

#[tokio::test]
async fn rfq_voice_session_end_to_end() {
    let screen = Arc::new(Screen::default());
    let mut dispatcher = Dispatcher::new(FunctionRegistry::with_builtin_functions());

    let err = dispatcher
        .execute("show_upload_form", Map::new())
        .await
        .expect_err("bridge not ready");
    assert!(matches!(err, VoiceError::NotInitialized(_)));

    dispatcher.initialize(screen.clone());

    for (id, name, size) in [("f1", "bom.csv", 2048), ("f2", "drawing.pdf", 4096)] {
        dispatcher
            .execute(
                "upload_file",
                object(json!({ "id": id, "name": name, "size": size })),
            )
            .await
            .expect("upload");
    }
    assert_eq!(*screen.files.lock().unwrap(), vec!["bom.csv", "drawing.pdf"]);

    let analysis = dispatcher
        .execute("show_bom_analysis", Map::new())
        .await
        .expect("analysis");
    assert!(analysis.success);
    assert_eq!(analysis.data.expect("summary")["totalBytes"], 6144);
    assert_eq!(*screen.view.lock().unwrap(), Some(View::RfqWizard));
    assert_eq!(*screen.step.lock().unwrap(), Some(2));
    assert!(dispatcher
        .state()
        .uploaded_files
        .iter()
        .all(|f| f.status == FileStatus::Analyzed));

    dispatcher
        .execute("set_payment_terms", object(json!({ "paymentTerms": "Net 30" })))
        .await
        .expect("payment terms");
    assert_eq!(
        *screen.terms.lock().unwrap(),
        vec![(CommercialTerm::PaymentTerms, "Net 30".to_string())]
    );

    let toasts_before = screen.toasts.lock().unwrap().len();
    dispatcher
        .execute("clear_uploaded_files", object(json!({ "confirm": true })))
        .await
        .expect("clear");
    assert!(dispatcher.state().uploaded_files.is_empty());
    assert!(dispatcher.state().active_analysis.is_none());
    assert_eq!(screen.toasts.lock().unwrap().len(), toasts_before + 1);
    assert_eq!(
        dispatcher.state().last_action.as_deref(),
        Some("clear_uploaded_files")
    );

    dispatcher.dispose();
    assert_eq!(dispatcher.state().current_step, 1);
    assert!(!dispatcher.bridge().is_initialized());
}

#[tokio::test]
async fn custom_functions_share_the_registry_state() {
    let mut registry = FunctionRegistry::with_builtin_functions();
    registry.register(FunctionDefinition::new(
        "request_quote_review",
        "Ask procurement to review the current RFQ.",
        ParameterSchema::object()
            .required_property("reviewer", PropertySchema::string("Reviewer email")),
        FnHandler::new(|ctx, args| {
            let reviewer = args
                .get("reviewer")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            ctx.state.apply(StateAction::Custom {
                tag: "review_requested".to_string(),
                payload: json!({ "reviewer": reviewer }),
            });
            ctx.bridge
                .get()?
                .show_notification(&format!("Review requested from {reviewer}"), Severity::Info);
            Ok(FunctionResult::ok("Review requested."))
        }),
    ));
    let screen = Arc::new(Screen::default());
    let mut dispatcher = Dispatcher::new(registry);
    dispatcher.initialize(screen.clone());

    let err = dispatcher
        .execute("request_quote_review", Map::new())
        .await
        .expect_err("missing reviewer");
    assert!(matches!(err, VoiceError::Validation { ref field, .. } if field == "reviewer"));
    assert!(screen.toasts.lock().unwrap().is_empty());

    dispatcher
        .execute(
            "request_quote_review",
            object(json!({ "reviewer": "buyer@robbie.dev" })),
        )
        .await
        .expect("review");
    assert!(dispatcher.state().context.get("review_requested").is_some());
    assert_eq!(
        dispatcher.registry().list().last().map(|d| d.name.as_str()),
        Some("request_quote_review")
    );
}

#[tokio::test]
async fn context_history_stays_bounded() {
    let mut registry = FunctionRegistry::new();
    for index in 0..CONTEXT_CAPACITY + 10 {
        registry.register(FunctionDefinition::new(
            format!("noop_{index}"),
            "no-op",
            ParameterSchema::object(),
            FnHandler::new(|_ctx, _args| Ok(FunctionResult::ok("ok"))),
        ));
    }
    let mut dispatcher = Dispatcher::new(registry);
    for index in 0..CONTEXT_CAPACITY + 10 {
        dispatcher
            .execute(&format!("noop_{index}"), Map::new())
            .await
            .expect("noop");
    }

    let context = &dispatcher.state().context;
    assert_eq!(context.len(), CONTEXT_CAPACITY);
    assert!(context.get("noop_0").is_none());
    assert!(context
        .get(&format!("noop_{}", CONTEXT_CAPACITY + 9))
        .is_some());
}

struct OneShotApi;

#[async_trait]
impl ConversationalApi for OneShotApi {
    async fn generate(&self, request: ModelRequest) -> Result<ModelReply, VoiceError> {
        assert!(request.system_instruction.contains("navigate_to"));
        Ok(ModelReply {
            parts: vec![ReplyPart::FunctionCall(FunctionCall {
                name: "navigate_to".to_string(),
                args: object(json!({ "destination": "rfq-list" })),
            })],
        })
    }
}

#[tokio::test]
async fn assistant_drives_the_dispatcher() {
    let screen = Arc::new(Screen::default());
    let mut dispatcher = Dispatcher::new(FunctionRegistry::with_builtin_functions());
    dispatcher.initialize(screen.clone());
    let mut assistant = VoiceAssistant::new(OneShotApi, dispatcher);

    let reply = assistant
        .handle_utterance("show my RFQs")
        .await
        .expect("reply");

    assert_eq!(reply.spoken, "Opening your RFQ list.");
    assert_eq!(*screen.view.lock().unwrap(), Some(View::RfqList));
    assert_eq!(assistant.turn_state(), TurnState::Speaking);
}
