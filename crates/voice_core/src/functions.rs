//! Built-in voice functions.
//!
//! The model sees a dynamic JSON schema per function; internally every call is
//! decoded into [`VoiceCommand`] before any state is touched.

use anyhow::Context as _;
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use shared::domain::{FileStatus, UploadedFile, WIZARD_STEPS};

use crate::{
    bridge::{CommercialTerm, Severity},
    registry::{FunctionDefinition, FunctionHandler, FunctionRegistry, FunctionResult, HandlerContext},
    schema::{ParameterSchema, PropertySchema},
    state::{StateAction, View},
};

const STEP_TITLES: [&str; WIZARD_STEPS as usize] = [
    "upload files",
    "BOM analysis",
    "commercial terms",
    "review and submit",
];

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "name", content = "args", rename_all = "snake_case")]
pub enum VoiceCommand {
    NavigateTo {
        destination: String,
    },
    SetCurrentStep {
        step: f64,
    },
    ShowUploadForm {
        #[serde(default = "default_true")]
        visible: bool,
    },
    UploadFile {
        id: String,
        name: String,
        #[serde(default, rename = "type")]
        mime_type: Option<String>,
        /// Models emit JSON numbers, so `2048.0` must decode too.
        #[serde(default)]
        size: Option<f64>,
    },
    ClearUploadedFiles {
        #[serde(default)]
        confirm: bool,
    },
    ShowBomAnalysis {},
    #[serde(rename_all = "camelCase")]
    SetLeadTime {
        lead_time: String,
    },
    #[serde(rename_all = "camelCase")]
    SetPaymentTerms {
        payment_terms: String,
    },
    ToggleSystemInfo {
        visible: bool,
    },
    #[serde(rename_all = "camelCase")]
    ShowFeatureDetail {
        #[serde(default)]
        feature_id: Option<String>,
    },
    GetCurrentStatus {},
}

fn default_true() -> bool {
    true
}

impl VoiceCommand {
    pub fn decode(name: &str, args: &Map<String, Value>) -> anyhow::Result<Self> {
        serde_json::from_value(json!({ "name": name, "args": args }))
            .with_context(|| format!("invalid arguments for '{name}'"))
    }

    pub fn name(&self) -> &'static str {
        match self {
            VoiceCommand::NavigateTo { .. } => "navigate_to",
            VoiceCommand::SetCurrentStep { .. } => "set_current_step",
            VoiceCommand::ShowUploadForm { .. } => "show_upload_form",
            VoiceCommand::UploadFile { .. } => "upload_file",
            VoiceCommand::ClearUploadedFiles { .. } => "clear_uploaded_files",
            VoiceCommand::ShowBomAnalysis {} => "show_bom_analysis",
            VoiceCommand::SetLeadTime { .. } => "set_lead_time",
            VoiceCommand::SetPaymentTerms { .. } => "set_payment_terms",
            VoiceCommand::ToggleSystemInfo { .. } => "toggle_system_info",
            VoiceCommand::ShowFeatureDetail { .. } => "show_feature_detail",
            VoiceCommand::GetCurrentStatus {} => "get_current_status",
        }
    }
}

/// Decodes its arguments into a [`VoiceCommand`] and runs it.
pub struct BuiltinHandler {
    name: &'static str,
}

#[async_trait]
impl FunctionHandler for BuiltinHandler {
    async fn call(
        &self,
        ctx: HandlerContext<'_>,
        args: &Map<String, Value>,
    ) -> anyhow::Result<FunctionResult> {
        let command = VoiceCommand::decode(self.name, args)?;
        run(command, ctx)
    }
}

pub fn register_builtins(registry: &mut FunctionRegistry) {
    for (name, description, parameters) in builtin_catalogue() {
        registry.register(FunctionDefinition::new(
            name,
            description,
            parameters,
            BuiltinHandler { name },
        ));
    }
}

fn builtin_catalogue() -> Vec<(&'static str, &'static str, ParameterSchema)> {
    let destinations = View::ALL.map(View::as_str);
    vec![
        (
            "navigate_to",
            "Navigate to a top-level screen of the application.",
            ParameterSchema::object().required_property(
                "destination",
                PropertySchema::string("Screen to open").with_enum(destinations),
            ),
        ),
        (
            "set_current_step",
            "Move the RFQ wizard to a specific step (1 upload files, 2 BOM analysis, 3 commercial terms, 4 review and submit).",
            ParameterSchema::object().required_property(
                "step",
                PropertySchema::integer("Wizard step number between 1 and 4"),
            ),
        ),
        (
            "show_upload_form",
            "Show or hide the file upload form.",
            ParameterSchema::object().property(
                "visible",
                PropertySchema::boolean("Whether the form should be visible; defaults to true"),
            ),
        ),
        (
            "upload_file",
            "Record a file the user uploaded for the current RFQ.",
            ParameterSchema::object()
                .required_property("id", PropertySchema::string("Unique file identifier"))
                .required_property("name", PropertySchema::string("File name"))
                .property("type", PropertySchema::string("MIME type"))
                .property("size", PropertySchema::integer("Size in bytes")),
        ),
        (
            "clear_uploaded_files",
            "Remove every uploaded file. Requires explicit confirmation from the user.",
            ParameterSchema::object().property(
                "confirm",
                PropertySchema::boolean("True only after the user confirmed removal"),
            ),
        ),
        (
            "show_bom_analysis",
            "Analyze the uploaded bill of materials and show the results.",
            ParameterSchema::object(),
        ),
        (
            "set_lead_time",
            "Set the requested lead time in the RFQ commercial terms.",
            ParameterSchema::object().required_property(
                "leadTime",
                PropertySchema::string("Lead time, for example '6-8 weeks'"),
            ),
        ),
        (
            "set_payment_terms",
            "Set the payment terms in the RFQ commercial terms.",
            ParameterSchema::object().required_property(
                "paymentTerms",
                PropertySchema::string("Payment terms, for example 'Net 30'"),
            ),
        ),
        (
            "toggle_system_info",
            "Show or hide the system information overlay.",
            ParameterSchema::object().required_property(
                "visible",
                PropertySchema::boolean("Whether the overlay should be visible"),
            ),
        ),
        (
            "show_feature_detail",
            "Open the detail panel for a product feature, or close it when no feature is given.",
            ParameterSchema::object().property(
                "featureId",
                PropertySchema::string("Feature identifier; omit or null to close the panel"),
            ),
        ),
        (
            "get_current_status",
            "Describe the current screen, wizard step and uploaded files.",
            ParameterSchema::object(),
        ),
    ]
}

pub fn run(command: VoiceCommand, ctx: HandlerContext<'_>) -> anyhow::Result<FunctionResult> {
    let HandlerContext { state, bridge } = ctx;

    match command {
        VoiceCommand::NavigateTo { destination } => {
            let Some(view) = View::parse(&destination) else {
                let known: Vec<&str> = View::ALL.iter().map(|v| v.as_str()).collect();
                return Ok(FunctionResult::failed(format!(
                    "I can't navigate to '{destination}'. Try one of: {}.",
                    known.join(", ")
                )));
            };
            bridge.get()?.navigate_to(view);
            state.apply(StateAction::Navigated(view));
            Ok(FunctionResult::ok(format!("Opening {}.", view.label()))
                .with_data(json!({ "view": view.as_str() })))
        }
        VoiceCommand::SetCurrentStep { step } => {
            if step.fract() != 0.0 || step < 1.0 || step > f64::from(WIZARD_STEPS) {
                return Ok(FunctionResult::failed(format!(
                    "Step must be a whole number between 1 and {WIZARD_STEPS}."
                )));
            }
            let step = step as u8;
            bridge.get()?.set_current_step(step);
            state.apply(StateAction::StepChanged(step));
            Ok(FunctionResult::ok(format!(
                "Moved to step {step}: {}.",
                STEP_TITLES[usize::from(step - 1)]
            ))
            .with_data(json!({ "step": step })))
        }
        VoiceCommand::ShowUploadForm { visible } => {
            bridge.get()?.set_show_upload_form(visible);
            let message = if visible {
                "Opening the upload form."
            } else {
                "Closing the upload form."
            };
            Ok(FunctionResult::ok(message))
        }
        VoiceCommand::UploadFile {
            id,
            name,
            mime_type,
            size,
        } => {
            let size = match size {
                None => 0,
                Some(bytes) if bytes.fract() == 0.0 && (0.0..=u64::MAX as f64).contains(&bytes) => {
                    bytes as u64
                }
                Some(bytes) => {
                    return Ok(FunctionResult::failed(format!(
                        "{bytes} is not a valid file size; use a whole number of bytes."
                    )));
                }
            };
            let ui = bridge.get()?;
            state.apply(StateAction::FileUploaded(UploadedFile {
                id,
                name: name.clone(),
                mime_type: mime_type.unwrap_or_else(|| "application/octet-stream".to_string()),
                size,
                uploaded_at: Utc::now(),
                status: FileStatus::Uploaded,
                analysis_result: None,
            }));
            ui.update_files(&state.uploaded_files);
            ui.show_notification(&format!("Uploaded {name}"), Severity::Success);
            let count = state.uploaded_files.len();
            Ok(FunctionResult::ok(format!(
                "{name} uploaded. You now have {count} {}.",
                plural(count, "file")
            ))
            .with_data(json!({ "fileCount": count })))
        }
        VoiceCommand::ClearUploadedFiles { confirm } => {
            let count = state.uploaded_files.len();
            if !confirm {
                return Ok(FunctionResult::failed(format!(
                    "Please confirm that you want to remove all {count} uploaded {}.",
                    plural(count, "file")
                ))
                .requiring_confirmation());
            }
            let ui = bridge.get()?;
            state.apply(StateAction::FilesReplaced(Vec::new()));
            state.active_analysis = None;
            ui.update_files(&[]);
            ui.show_notification(
                &format!("Removed {count} {}", plural(count, "file")),
                Severity::Info,
            );
            Ok(FunctionResult::ok(format!(
                "Removed {count} uploaded {}.",
                plural(count, "file")
            )))
        }
        VoiceCommand::ShowBomAnalysis {} => {
            if state.uploaded_files.is_empty() {
                return Ok(FunctionResult::failed(
                    "Upload a bill of materials first, then I can analyze it.",
                )
                .requiring_files());
            }
            let ui = bridge.get()?;
            let analyzed_at = Utc::now();
            for file in &mut state.uploaded_files {
                file.status = FileStatus::Analyzed;
                file.analysis_result = Some(json!({
                    "analyzedAt": analyzed_at,
                    "sizeBytes": file.size,
                }));
            }
            let summary = json!({
                "fileCount": state.uploaded_files.len(),
                "totalBytes": state.uploaded_files.iter().map(|f| f.size).sum::<u64>(),
                "files": state.uploaded_files.iter().map(|f| f.name.as_str()).collect::<Vec<_>>(),
                "analyzedAt": analyzed_at,
            });
            let count = state.uploaded_files.len();
            state.apply(StateAction::AnalysisComplete(summary.clone()));
            state.apply(StateAction::Navigated(View::RfqWizard));
            state.apply(StateAction::StepChanged(2));

            ui.update_files(&state.uploaded_files);
            ui.navigate_to(View::RfqWizard);
            ui.set_current_step(2);
            ui.show_notification("BOM analysis complete", Severity::Success);

            Ok(FunctionResult::ok(format!(
                "Analyzed {count} {}. The results are on the BOM analysis step.",
                plural(count, "file")
            ))
            .with_data(summary))
        }
        VoiceCommand::SetLeadTime { lead_time } => {
            set_commercial_term(bridge.get()?, CommercialTerm::LeadTime, &lead_time)
        }
        VoiceCommand::SetPaymentTerms { payment_terms } => {
            set_commercial_term(bridge.get()?, CommercialTerm::PaymentTerms, &payment_terms)
        }
        VoiceCommand::ToggleSystemInfo { visible } => {
            bridge.get()?.set_show_system_info(visible);
            let message = if visible {
                "Showing system information."
            } else {
                "Hiding system information."
            };
            Ok(FunctionResult::ok(message))
        }
        VoiceCommand::ShowFeatureDetail { feature_id } => {
            let feature_id = feature_id
                .as_deref()
                .map(str::trim)
                .filter(|id| !id.is_empty());
            bridge.get()?.set_detail_panel(feature_id);
            Ok(match feature_id {
                Some(id) => FunctionResult::ok(format!("Showing details for {id}.")),
                None => FunctionResult::ok("Closing the feature details."),
            })
        }
        VoiceCommand::GetCurrentStatus {} => {
            let count = state.uploaded_files.len();
            let files: Vec<Value> = state
                .uploaded_files
                .iter()
                .map(|f| json!({ "name": f.name, "status": f.status }))
                .collect();
            Ok(FunctionResult::ok(format!(
                "You're on {}, step {} of {WIZARD_STEPS}, with {count} uploaded {}.",
                state.current_view.label(),
                state.current_step,
                plural(count, "file")
            ))
            .with_data(json!({
                "view": state.current_view.as_str(),
                "step": state.current_step,
                "files": files,
                "lastAction": state.last_action,
                "hasAnalysis": state.active_analysis.is_some(),
            })))
        }
    }
}

fn set_commercial_term(
    ui: &dyn crate::bridge::UiBridge,
    term: CommercialTerm,
    raw: &str,
) -> anyhow::Result<FunctionResult> {
    let value = raw.trim();
    if value.is_empty() {
        return Ok(FunctionResult::failed(format!(
            "I didn't catch the {}.",
            term.label()
        )));
    }
    ui.set_commercial_term(term, value);
    let mut data = Map::new();
    data.insert(term_key(term).to_string(), Value::String(value.to_string()));
    Ok(FunctionResult::ok(format!("Set {} to {value}.", term.label())).with_data(Value::Object(data)))
}

fn term_key(term: CommercialTerm) -> &'static str {
    match term {
        CommercialTerm::LeadTime => "leadTime",
        CommercialTerm::PaymentTerms => "paymentTerms",
        CommercialTerm::Incoterms => "incoterms",
    }
}

fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        noun.to_string()
    } else {
        format!("{noun}s")
    }
}

#[cfg(test)]
#[path = "tests/functions_tests.rs"]
mod tests;
