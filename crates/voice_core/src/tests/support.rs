use std::sync::{Arc, Mutex};

use shared::domain::UploadedFile;

use crate::{
    bridge::{CommercialTerm, Severity, UiBridge},
    dispatcher::Dispatcher,
    registry::FunctionRegistry,
    state::View,
};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum BridgeCall {
    ShowUploadForm(bool),
    CurrentStep(u8),
    Navigate(View),
    Files(Vec<String>),
    Notification(String, Severity),
    SystemInfo(bool),
    DetailPanel(Option<String>),
    CommercialTerm(CommercialTerm, String),
}

#[derive(Default)]
pub(crate) struct RecordingBridge {
    calls: Mutex<Vec<BridgeCall>>,
}

impl RecordingBridge {
    fn push(&self, call: BridgeCall) {
        self.calls.lock().expect("calls lock").push(call);
    }

    pub(crate) fn calls(&self) -> Vec<BridgeCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub(crate) fn notifications(&self) -> Vec<(String, Severity)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BridgeCall::Notification(message, severity) => Some((message, severity)),
                _ => None,
            })
            .collect()
    }
}

impl UiBridge for RecordingBridge {
    fn set_show_upload_form(&self, visible: bool) {
        self.push(BridgeCall::ShowUploadForm(visible));
    }

    fn set_current_step(&self, step: u8) {
        self.push(BridgeCall::CurrentStep(step));
    }

    fn navigate_to(&self, view: View) {
        self.push(BridgeCall::Navigate(view));
    }

    fn update_files(&self, files: &[UploadedFile]) {
        self.push(BridgeCall::Files(
            files.iter().map(|file| file.id.clone()).collect(),
        ));
    }

    fn show_notification(&self, message: &str, severity: Severity) {
        self.push(BridgeCall::Notification(message.to_string(), severity));
    }

    fn set_show_system_info(&self, visible: bool) {
        self.push(BridgeCall::SystemInfo(visible));
    }

    fn set_detail_panel(&self, feature_id: Option<&str>) {
        self.push(BridgeCall::DetailPanel(feature_id.map(str::to_string)));
    }

    fn set_commercial_term(&self, term: CommercialTerm, value: &str) {
        self.push(BridgeCall::CommercialTerm(term, value.to_string()));
    }
}

pub(crate) fn builtin_dispatcher() -> (Dispatcher, Arc<RecordingBridge>) {
    let bridge = Arc::new(RecordingBridge::default());
    let mut dispatcher = Dispatcher::new(FunctionRegistry::with_builtin_functions());
    dispatcher.initialize(bridge.clone());
    (dispatcher, bridge)
}

pub(crate) fn args(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("expected object arguments, got {other}"),
    }
}
