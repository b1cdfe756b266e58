use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde_json::{Map, Value, json};

use crate::condition::{ValueSnapshot, coerce_string};
use crate::spec::field::{FieldDefinition, FieldType};
use crate::spec::form::{FormDefinition, FormSettings};
use crate::steps::{layout_rows, progress_percent, step_at, visible_step_fields};
use crate::visibility::is_required;

/// Name of the field whose value filters the state list.
pub const COUNTRY_FIELD: &str = "country";

/// Country or subdivision entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub code: String,
    pub name: String,
}

impl Region {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
        }
    }
}

/// Opaque country/state reference data.
pub trait RegionDirectory: Send + Sync {
    fn countries(&self) -> Vec<Region>;
    fn states(&self, country_code: &str) -> Vec<Region>;
}

/// Directory without any entries; country and state render as free text.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRegions;

impl RegionDirectory for NoRegions {
    fn countries(&self) -> Vec<Region> {
        Vec::new()
    }

    fn states(&self, _country_code: &str) -> Vec<Region> {
        Vec::new()
    }
}

/// Everything a widget renderer may look at.
pub struct RenderContext<'a> {
    pub values: &'a ValueSnapshot,
    pub settings: &'a FormSettings,
    pub required: bool,
    pub error: Option<&'a str>,
    pub regions: &'a dyn RegionDirectory,
}

/// Produces a JSON widget descriptor for one field.
pub trait FieldRenderer: Send + Sync {
    fn render(&self, field: &FieldDefinition, ctx: &RenderContext<'_>) -> Value;
}

impl<F> FieldRenderer for F
where
    F: Fn(&FieldDefinition, &RenderContext<'_>) -> Value + Send + Sync,
{
    fn render(&self, field: &FieldDefinition, ctx: &RenderContext<'_>) -> Value {
        self(field, ctx)
    }
}

/// Field type name to renderer. Custom types can be registered without
/// touching [`FieldType`].
#[derive(Clone, Default)]
pub struct RendererRegistry {
    renderers: HashMap<String, Arc<dyn FieldRenderer>>,
}

impl RendererRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry covering every built-in field type.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        for kind in [
            FieldType::Text,
            FieldType::Email,
            FieldType::Phone,
            FieldType::Url,
            FieldType::Number,
            FieldType::Date,
            FieldType::Time,
            FieldType::Datetime,
            FieldType::Hidden,
        ] {
            registry.register(kind.as_str(), input_widget);
        }
        registry.register(FieldType::Textarea.as_str(), textarea_widget);
        registry.register(FieldType::Select.as_str(), choice_widget);
        registry.register(FieldType::Radio.as_str(), choice_widget);
        registry.register(FieldType::CheckboxGroup.as_str(), choice_widget);
        registry.register(FieldType::Checkbox.as_str(), checkbox_widget);
        registry.register(FieldType::File.as_str(), file_widget);
        registry.register(FieldType::Country.as_str(), country_widget);
        registry.register(FieldType::State.as_str(), state_widget);
        registry.register(FieldType::Html.as_str(), static_widget);
        registry.register(FieldType::Divider.as_str(), static_widget);
        registry.register(FieldType::Recaptcha.as_str(), recaptcha_widget);
        registry
    }

    /// Adds or replaces the renderer for a type name.
    pub fn register(
        &mut self,
        type_name: impl Into<String>,
        renderer: impl FieldRenderer + 'static,
    ) {
        self.renderers.insert(type_name.into(), Arc::new(renderer));
    }

    pub fn get(&self, kind: &FieldType) -> Option<&Arc<dyn FieldRenderer>> {
        self.renderers.get(kind.as_str())
    }

    pub fn render(&self, field: &FieldDefinition, ctx: &RenderContext<'_>) -> Option<Value> {
        match self.get(&field.kind) {
            Some(renderer) => Some(renderer.render(field, ctx)),
            None => {
                tracing::warn!(
                    field = %field.name,
                    field_type = %field.kind,
                    "no renderer registered; skipping field"
                );
                None
            }
        }
    }
}

impl std::fmt::Debug for RendererRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<&String> = self.renderers.keys().collect();
        kinds.sort();
        f.debug_struct("RendererRegistry").field("kinds", &kinds).finish()
    }
}

/// Common descriptor keys shared by every widget.
pub fn base_widget(
    widget: &str,
    field: &FieldDefinition,
    ctx: &RenderContext<'_>,
) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("widget".into(), Value::String(widget.to_string()));
    map.insert("id".into(), Value::String(field.id.clone()));
    map.insert("name".into(), Value::String(field.name.clone()));
    map.insert("type".into(), Value::String(field.kind.as_str().to_string()));
    map.insert("label".into(), Value::String(field.label.clone()));
    map.insert("width".into(), Value::String(field.width.as_str().to_string()));
    map.insert("required".into(), Value::Bool(ctx.required));
    if let Some(placeholder) = &field.placeholder {
        map.insert("placeholder".into(), Value::String(placeholder.clone()));
    }
    if let Some(help) = &field.help_text {
        map.insert("help_text".into(), Value::String(help.clone()));
    }
    if let Some(class) = &field.css_class {
        map.insert("css_class".into(), Value::String(class.clone()));
    }
    if let Some(value) = ctx.values.get(&field.name) {
        map.insert("value".into(), value.clone());
    }
    if let Some(error) = ctx.error {
        map.insert("error".into(), Value::String(error.to_string()));
    }
    map
}

fn input_widget(field: &FieldDefinition, ctx: &RenderContext<'_>) -> Value {
    let input_type = match field.kind {
        FieldType::Email => "email",
        FieldType::Phone => "tel",
        FieldType::Url => "url",
        FieldType::Number => "number",
        FieldType::Date => "date",
        FieldType::Time => "time",
        FieldType::Datetime => "datetime-local",
        FieldType::Hidden => "hidden",
        _ => "text",
    };
    let mut map = base_widget("input", field, ctx);
    map.insert("input_type".into(), Value::String(input_type.into()));
    if let Some(rules) = field.rules() {
        for (key, bound) in [("min", rules.min), ("max", rules.max)] {
            if let Some(bound) = bound {
                map.insert(key.into(), json!(bound));
            }
        }
        if let Some(max_length) = rules.max_length {
            map.insert("max_length".into(), json!(max_length));
        }
    }
    Value::Object(map)
}

fn textarea_widget(field: &FieldDefinition, ctx: &RenderContext<'_>) -> Value {
    let mut map = base_widget("textarea", field, ctx);
    if let Some(max_length) = field.rules().and_then(|rules| rules.max_length) {
        map.insert("max_length".into(), json!(max_length));
    }
    Value::Object(map)
}

fn choice_widget(field: &FieldDefinition, ctx: &RenderContext<'_>) -> Value {
    let widget = match field.kind {
        FieldType::Radio => "radio",
        FieldType::CheckboxGroup => "checkbox_group",
        _ => "select",
    };
    let mut map = base_widget(widget, field, ctx);
    let options = field.options.clone().unwrap_or_default();
    map.insert(
        "options".into(),
        Value::Array(
            options
                .options
                .iter()
                .map(|option| json!({ "value": option.value, "label": option.label }))
                .collect(),
        ),
    );
    map.insert("allow_other".into(), Value::Bool(options.allow_other));
    if let Some(other_label) = &options.other_label {
        map.insert("other_label".into(), Value::String(other_label.clone()));
    }
    if options.multiple {
        map.insert("multiple".into(), Value::Bool(true));
    }
    if options.searchable {
        map.insert("searchable".into(), Value::Bool(true));
    }
    Value::Object(map)
}

fn checkbox_widget(field: &FieldDefinition, ctx: &RenderContext<'_>) -> Value {
    let mut map = base_widget("checkbox", field, ctx);
    let checked = ctx.values.get(&field.name).and_then(Value::as_bool).unwrap_or(false);
    map.insert("checked".into(), Value::Bool(checked));
    Value::Object(map)
}

fn file_widget(field: &FieldDefinition, ctx: &RenderContext<'_>) -> Value {
    let mut map = base_widget("file", field, ctx);
    if let Some(rules) = field.rules() {
        if let Some(types) = &rules.allowed_types {
            map.insert("accept".into(), Value::String(types.join(",")));
        }
        if let Some(size) = rules.max_file_size {
            map.insert("max_file_size_mb".into(), json!(size));
        }
    }
    Value::Object(map)
}

fn region_options(regions: &[Region]) -> Value {
    Value::Array(
        regions
            .iter()
            .map(|region| json!({ "value": region.code, "label": region.name }))
            .collect(),
    )
}

fn country_widget(field: &FieldDefinition, ctx: &RenderContext<'_>) -> Value {
    let mut map = base_widget("select", field, ctx);
    map.insert("options".into(), region_options(&ctx.regions.countries()));
    Value::Object(map)
}

fn state_widget(field: &FieldDefinition, ctx: &RenderContext<'_>) -> Value {
    let country = coerce_string(ctx.values.get(COUNTRY_FIELD));
    let states = ctx.regions.states(&country);
    if states.is_empty() {
        let mut map = base_widget("input", field, ctx);
        map.insert("input_type".into(), Value::String("text".into()));
        return Value::Object(map);
    }
    let mut map = base_widget("select", field, ctx);
    map.insert("options".into(), region_options(&states));
    Value::Object(map)
}

fn static_widget(field: &FieldDefinition, ctx: &RenderContext<'_>) -> Value {
    let mut map = base_widget(field.kind.as_str(), field, ctx);
    map.remove("required");
    if let Some(Value::String(content)) = &field.default_value {
        map.insert("content".into(), Value::String(content.clone()));
    }
    Value::Object(map)
}

fn recaptcha_widget(field: &FieldDefinition, ctx: &RenderContext<'_>) -> Value {
    let mut map = base_widget("recaptcha", field, ctx);
    if let Some(site_key) = &ctx.settings.recaptcha_site_key {
        map.insert("site_key".into(), Value::String(site_key.clone()));
    }
    Value::Object(map)
}

/// Session status labels exposed to renderers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStatus {
    Ready,
    Submitting,
    Success,
}

impl RenderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderStatus::Ready => "ready",
            RenderStatus::Submitting => "submitting",
            RenderStatus::Success => "success",
        }
    }
}

/// Step indicator data.
#[derive(Debug, Clone)]
pub struct RenderStep {
    pub index: usize,
    pub total: usize,
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub progress: u8,
}

impl RenderStep {
    pub fn is_first(&self) -> bool {
        self.index == 0
    }

    pub fn is_last(&self) -> bool {
        self.index + 1 >= self.total
    }
}

/// Collected payload used by both text and JSON renderers.
#[derive(Debug, Clone)]
pub struct RenderPayload {
    pub form_id: String,
    pub form_name: String,
    pub description: Option<String>,
    pub status: RenderStatus,
    pub step: RenderStep,
    pub rows: Vec<Vec<Value>>,
    pub errors: BTreeMap<String, String>,
    pub submit_label: String,
    pub consent_text: Option<String>,
    pub success_message: Option<String>,
}

/// Inputs of a single render pass.
pub struct RenderInput<'a> {
    pub form: &'a FormDefinition,
    pub values: &'a ValueSnapshot,
    pub current_step: usize,
    pub errors: &'a BTreeMap<String, String>,
    pub status: RenderStatus,
}

/// Build the renderer payload for the current step.
pub fn build_render_payload(
    input: &RenderInput<'_>,
    registry: &RendererRegistry,
    regions: &dyn RegionDirectory,
) -> RenderPayload {
    let form = input.form;
    let total = form.total_steps();
    let index = input.current_step.min(total.saturating_sub(1));
    let (id, name, description) = match step_at(form, index) {
        Some(step) => (step.id.clone(), step.name.clone(), step.description.clone()),
        None => (String::new(), String::new(), None),
    };
    let step = RenderStep {
        index,
        total,
        id,
        name,
        description,
        progress: progress_percent(index, total),
    };

    let fields = visible_step_fields(form, index, input.values);
    let rows = layout_rows(&fields, form.design.layout)
        .into_iter()
        .map(|row| {
            row.into_iter()
                .filter_map(|field| {
                    let ctx = RenderContext {
                        values: input.values,
                        settings: &form.settings,
                        required: is_required(field, input.values),
                        error: input.errors.get(&field.name).map(String::as_str),
                        regions,
                    };
                    registry.render(field, &ctx)
                })
                .collect::<Vec<_>>()
        })
        .filter(|row| !row.is_empty())
        .collect();

    let consent_text = (form.settings.show_consent_checkbox && step.is_last())
        .then(|| form.settings.consent_text().to_string());
    let success_message = (input.status == RenderStatus::Success)
        .then(|| form.settings.success_message.clone());

    RenderPayload {
        form_id: form.id.clone(),
        form_name: form.name.clone(),
        description: form.description.clone(),
        status: input.status,
        step,
        rows,
        errors: input.errors.clone(),
        submit_label: form.settings.submit_button_text.clone(),
        consent_text,
        success_message,
    }
}

/// Render the payload as a structured JSON-friendly value.
pub fn render_json_ui(payload: &RenderPayload) -> Value {
    json!({
        "form_id": payload.form_id,
        "form_name": payload.form_name,
        "description": payload.description,
        "status": payload.status.as_str(),
        "step": {
            "index": payload.step.index,
            "total": payload.step.total,
            "id": payload.step.id,
            "name": payload.step.name,
            "description": payload.step.description,
            "progress": payload.step.progress,
            "is_first": payload.step.is_first(),
            "is_last": payload.step.is_last(),
        },
        "rows": payload.rows,
        "errors": payload.errors,
        "submit_label": payload.submit_label,
        "consent_text": payload.consent_text,
        "success_message": payload.success_message,
    })
}

/// Render the payload as human-friendly text.
pub fn render_text(payload: &RenderPayload) -> String {
    let mut lines = Vec::new();
    lines.push(format!("Form: {} ({})", payload.form_name, payload.form_id));
    if let Some(message) = &payload.success_message {
        lines.push(format!("Status: {}", payload.status.as_str()));
        lines.push(message.clone());
        return lines.join("\n");
    }
    lines.push(format!(
        "Step {}/{}: {} ({}%)",
        payload.step.index + 1,
        payload.step.total,
        payload.step.name,
        payload.step.progress
    ));
    if let Some(description) = &payload.step.description {
        lines.push(format!("  {}", description));
    }

    for row in &payload.rows {
        let entries: Vec<String> = row.iter().map(widget_summary).collect();
        lines.push(format!(" - {}", entries.join(" | ")));
    }
    if let Some(consent) = &payload.consent_text {
        lines.push(format!(" [ ] {}", consent));
    }

    if !payload.errors.is_empty() {
        lines.push("Errors:".to_string());
        for (name, message) in &payload.errors {
            lines.push(format!("  {}: {}", name, message));
        }
    }
    lines.join("\n")
}

fn widget_summary(widget: &Value) -> String {
    let label = widget
        .get("label")
        .and_then(Value::as_str)
        .filter(|label| !label.is_empty())
        .or_else(|| widget.get("name").and_then(Value::as_str))
        .unwrap_or_default();
    let mut entry = label.to_string();
    if widget.get("required").and_then(Value::as_bool) == Some(true) {
        entry.push_str(" *");
    }
    if let Some(value) = widget.get("value") {
        entry.push_str(&format!(" = {}", coerce_string(Some(value))));
    }
    entry
}
