#![allow(missing_docs)]

pub mod condition;
pub mod error;
pub mod messages;
pub mod render;
pub mod spec;
pub mod steps;
pub mod validate;
pub mod visibility;

pub use condition::{ValueSnapshot, compare, is_empty};
pub use error::SpecError;
pub use messages::{MessageCatalog, MessageKey, MessageTemplates};
pub use render::{
    FieldRenderer, NoRegions, Region, RegionDirectory, RenderContext, RenderInput, RenderPayload,
    RenderStatus, RenderStep, RendererRegistry, build_render_payload, render_json_ui, render_text,
};
pub use spec::{
    ButtonStyle, Condition, ConditionalLogic, DEFAULT_CONSENT_TEXT, FieldDefinition, FieldOptions,
    FieldType, FieldWidth, FormDefinition, FormDesign, FormLayout, FormSettings, FormStep,
    Operator, SelectOption, ValidationRules,
};
pub use steps::{
    StepView, layout_rows, ordered_steps, pack_rows, progress_percent, step_at, step_members,
    steps_for, visible_step_fields,
};
pub use validate::{FileValue, FormValidator, ValidationOutcome};
pub use visibility::{
    VisibilityMap, is_required, is_visible, required_names, resolve_visibility, visible_fields,
};

/// Parse a form definition from JSON text.
pub fn parse_definition(text: &str) -> Result<FormDefinition, SpecError> {
    Ok(serde_json::from_str(text)?)
}

/// JSON Schema describing the form definition document.
pub fn definition_schema() -> serde_json::Value {
    serde_json::to_value(schemars::schema_for!(FormDefinition)).unwrap_or(serde_json::Value::Null)
}
