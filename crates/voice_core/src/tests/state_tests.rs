use super::*;
use shared::domain::FileStatus;

fn file(id: &str, name: &str) -> UploadedFile {
    UploadedFile {
        id: id.to_string(),
        name: name.to_string(),
        mime_type: "text/csv".to_string(),
        size: 128,
        uploaded_at: Utc::now(),
        status: FileStatus::Uploaded,
        analysis_result: None,
    }
}

fn entry(n: i64) -> ContextEntry {
    ContextEntry {
        parameters: serde_json::json!({ "n": n }),
        result: None,
        error: None,
        timestamp: Utc::now(),
    }
}

#[test]
fn upsert_replaces_file_with_same_id() {
    let mut state = ConversationState::default();
    state.apply(StateAction::FileUploaded(file("f1", "bom.csv")));
    state.apply(StateAction::FileUploaded(file("f2", "drawing.pdf")));
    state.apply(StateAction::FileUploaded(file("f1", "bom-v2.csv")));

    let names: Vec<&str> = state
        .uploaded_files
        .iter()
        .map(|f| f.name.as_str())
        .collect();
    assert_eq!(names, vec!["bom-v2.csv", "drawing.pdf"]);
}

#[test]
fn custom_tags_are_stored_in_context() {
    let mut state = ConversationState::default();
    state.apply(StateAction::Custom {
        tag: "supplier_shortlisted".to_string(),
        payload: serde_json::json!({ "supplier": "Acme" }),
    });

    let stored = state.context.get("supplier_shortlisted").expect("entry");
    assert_eq!(stored.parameters["supplier"], "Acme");
    assert!(state.last_action.is_none());
}

#[test]
fn navigation_and_step_actions_update_fields() {
    let mut state = ConversationState::default();
    assert_eq!(state.current_step, 1);
    state.apply(StateAction::Navigated(View::RfqWizard));
    state.apply(StateAction::StepChanged(3));
    state.apply(StateAction::FilesReplaced(vec![file("f9", "x.step")]));

    assert_eq!(state.current_view, View::RfqWizard);
    assert_eq!(state.current_step, 3);
    assert_eq!(state.uploaded_files.len(), 1);
}

#[test]
fn context_evicts_least_recently_written_key() {
    let mut context = ActionContext::with_capacity(2);
    context.insert("a", entry(1));
    context.insert("b", entry(2));
    context.insert("a", entry(3));
    context.insert("c", entry(4));

    assert!(context.get("b").is_none());
    assert_eq!(context.get("a").expect("a").parameters["n"], 3);
    assert_eq!(context.keys().collect::<Vec<_>>(), vec!["a", "c"]);
    assert_eq!(context.len(), 2);
}

#[test]
fn view_parse_accepts_loose_spelling() {
    assert_eq!(View::parse("RFQ-Wizard"), Some(View::RfqWizard));
    assert_eq!(View::parse("rfq list"), Some(View::RfqList));
    assert_eq!(View::parse("moon"), None);
}
