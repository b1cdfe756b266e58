use std::collections::BTreeMap;

use serde_json::{Value, json};

use form_spec::{
    FormDefinition, NoRegions, RenderInput, RenderStatus, RendererRegistry, ValueSnapshot,
    build_render_payload, parse_definition, render_json_ui, render_text,
};

fn fixture(name: &str) -> &'static str {
    match name {
        "contact_form" => include_str!("../tests/fixtures/contact_form.json"),
        "multi_step" => include_str!("../tests/fixtures/multi_step.json"),
        _ => panic!("unknown fixture {}", name),
    }
}

fn load(name: &str) -> FormDefinition {
    parse_definition(fixture(name)).expect("deserialize")
}

fn render(form: &FormDefinition, values: Value, step: usize, status: RenderStatus) -> Value {
    let values: ValueSnapshot = values.as_object().cloned().expect("object");
    let errors = BTreeMap::new();
    let payload = build_render_payload(
        &RenderInput {
            form,
            values: &values,
            current_step: step,
            errors: &errors,
            status,
        },
        &RendererRegistry::with_defaults(),
        &NoRegions,
    );
    render_json_ui(&payload)
}

fn row_names(ui: &Value) -> Vec<Vec<String>> {
    ui["rows"]
        .as_array()
        .expect("rows")
        .iter()
        .map(|row| {
            row.as_array()
                .expect("row")
                .iter()
                .map(|widget| widget["name"].as_str().unwrap_or_default().to_string())
                .collect()
        })
        .collect()
}

#[test]
fn two_column_contact_form_packs_half_widths() {
    let form = load("contact_form");
    let ui = render(&form, json!({}), 0, RenderStatus::Ready);

    assert_eq!(ui["status"], "ready");
    assert_eq!(ui["step"]["progress"], 100);
    assert_eq!(ui["submit_label"], "Send message");
    assert_eq!(ui["consent_text"], "I agree to be contacted");
    assert_eq!(
        row_names(&ui),
        vec![
            vec!["first_name", "last_name"],
            vec!["email"],
            vec!["country", "state"],
            vec!["topic"],
            vec!["note"],
            vec!["message"],
        ]
    );
    assert_eq!(ui["rows"][4][0]["content"], "<p>Fields marked * are required.</p>");
}

#[test]
fn revealed_fields_and_required_flags_follow_values() {
    let form = load("contact_form");
    let ui = render(
        &form,
        json!({ "country": "US", "topic": "support" }),
        0,
        RenderStatus::Ready,
    );
    let names = row_names(&ui);
    assert!(names.iter().flatten().any(|name| name == "order_id"));
    assert_eq!(ui["rows"][2][1]["name"], "state");
    assert_eq!(ui["rows"][2][1]["required"], true);
}

#[test]
fn multi_step_payload_reports_step_indicator() {
    let form = load("multi_step");
    let first = render(&form, json!({}), 0, RenderStatus::Ready);
    assert_eq!(first["step"]["name"], "Account");
    assert_eq!(first["step"]["progress"], 50);
    assert_eq!(first["step"]["is_first"], true);
    assert_eq!(first["step"]["is_last"], false);
    assert!(first["consent_text"].is_null());

    let second = render(&form, json!({ "company": "Acme" }), 1, RenderStatus::Ready);
    assert_eq!(second["step"]["description"], "Tell us about your team");
    assert_eq!(row_names(&second), vec![vec!["company"], vec!["team_size"], vec!["channels"]]);
    assert_eq!(second["rows"][2][0]["widget"], "checkbox_group");
}

#[test]
fn render_text_lists_rows_and_success() {
    let form = load("multi_step");
    let values: ValueSnapshot = json!({ "email": "a@b.com" }).as_object().cloned().expect("object");
    let errors = BTreeMap::from([(
        "email".to_string(),
        "Please enter a valid email address".to_string(),
    )]);
    let registry = RendererRegistry::with_defaults();
    let payload = build_render_payload(
        &RenderInput {
            form: &form,
            values: &values,
            current_step: 0,
            errors: &errors,
            status: RenderStatus::Ready,
        },
        &registry,
        &NoRegions,
    );
    let text = render_text(&payload);
    assert!(text.contains("Form: Onboarding (onboarding)"));
    assert!(text.contains("Step 1/2: Account (50%)"));
    assert!(text.contains("Email * = a@b.com"));
    assert!(text.contains("Errors:"));

    let done = build_render_payload(
        &RenderInput {
            form: &form,
            values: &values,
            current_step: 1,
            errors: &BTreeMap::new(),
            status: RenderStatus::Success,
        },
        &registry,
        &NoRegions,
    );
    assert!(render_text(&done).contains("Status: success"));
}
