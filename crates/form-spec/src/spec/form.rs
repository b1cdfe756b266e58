use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::spec::field::FieldDefinition;

/// How fields are arranged on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Value", into = "String")]
pub enum FormLayout {
    #[default]
    Vertical,
    Horizontal,
    TwoColumn,
}

impl FormLayout {
    pub fn as_str(&self) -> &'static str {
        match self {
            FormLayout::Vertical => "vertical",
            FormLayout::Horizontal => "horizontal",
            FormLayout::TwoColumn => "two_column",
        }
    }
}

impl From<String> for FormLayout {
    fn from(value: String) -> Self {
        match value.as_str() {
            "horizontal" => FormLayout::Horizontal,
            "two_column" => FormLayout::TwoColumn,
            _ => FormLayout::Vertical,
        }
    }
}

impl From<Value> for FormLayout {
    fn from(value: Value) -> Self {
        match value {
            Value::String(name) => FormLayout::from(name),
            _ => FormLayout::Vertical,
        }
    }
}

impl From<FormLayout> for String {
    fn from(value: FormLayout) -> Self {
        value.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct ButtonStyle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub border_radius: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, deserialize_with = "crate::spec::null_as_default")]
    pub full_width: bool,
}

/// Presentation hints for a form. Carried through untouched apart from `layout`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct FormDesign {
    #[serde(default)]
    #[schemars(with = "String")]
    pub layout: FormLayout,
    #[serde(default, deserialize_with = "crate::spec::null_as_default")]
    pub theme: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub border_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub padding: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_spacing: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button_style: Option<ButtonStyle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_css: Option<String>,
    #[serde(default, deserialize_with = "crate::spec::null_as_default")]
    pub show_logo: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
}

/// Submission behaviour configured on the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FormSettings {
    #[serde(default = "default_submit_text", deserialize_with = "submit_text_or_default")]
    pub submit_button_text: String,
    #[serde(default, deserialize_with = "crate::spec::null_as_default")]
    pub success_message: String,
    #[serde(default, deserialize_with = "crate::spec::null_as_default")]
    pub enable_recaptcha: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recaptcha_site_key: Option<String>,
    #[serde(default, deserialize_with = "crate::spec::null_as_default")]
    pub show_consent_checkbox: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consent_text: Option<String>,
}

pub const DEFAULT_CONSENT_TEXT: &str = "I agree to the terms and conditions";

fn default_submit_text() -> String {
    "Submit".to_string()
}

fn submit_text_or_default<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?
        .filter(|text| !text.trim().is_empty())
        .unwrap_or_else(default_submit_text))
}

impl FormSettings {
    /// Consent label, falling back to a generic agreement when unset or blank.
    pub fn consent_text(&self) -> &str {
        self.consent_text
            .as_deref()
            .filter(|text| !text.trim().is_empty())
            .unwrap_or(DEFAULT_CONSENT_TEXT)
    }
}

impl Default for FormSettings {
    fn default() -> Self {
        Self {
            submit_button_text: default_submit_text(),
            success_message: String::new(),
            enable_recaptcha: false,
            recaptcha_site_key: None,
            show_consent_checkbox: false,
            consent_text: None,
        }
    }
}

/// Page of a multi-step form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FormStep {
    pub id: String,
    #[serde(default, deserialize_with = "crate::spec::null_as_default")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "crate::spec::null_as_default")]
    pub field_ids: Vec<String>,
    #[serde(default, deserialize_with = "crate::spec::null_as_default")]
    pub display_order: i64,
}

/// Immutable aggregate fetched once per session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FormDefinition {
    pub id: String,
    #[serde(default, deserialize_with = "crate::spec::null_as_default")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "crate::spec::null_as_default")]
    pub fields: Vec<FieldDefinition>,
    #[serde(default, deserialize_with = "crate::spec::null_as_default")]
    pub design: FormDesign,
    #[serde(default, deserialize_with = "crate::spec::null_as_default")]
    pub is_multi_step: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<FormStep>>,
    #[serde(default, deserialize_with = "crate::spec::null_as_default")]
    pub settings: FormSettings,
}

impl FormDefinition {
    /// Active fields in `display_order`; ties keep their declared order.
    pub fn active_fields(&self) -> Vec<&FieldDefinition> {
        let mut fields: Vec<&FieldDefinition> =
            self.fields.iter().filter(|field| field.is_active).collect();
        fields.sort_by_key(|field| field.display_order);
        fields
    }

    pub fn field_by_name(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields
            .iter()
            .find(|field| field.is_active && field.name == name)
    }

    /// Declared steps when the form is multi-step and has at least one.
    pub fn declared_steps(&self) -> Option<&[FormStep]> {
        match &self.steps {
            Some(steps) if self.is_multi_step && !steps.is_empty() => Some(steps),
            _ => None,
        }
    }

    pub fn total_steps(&self) -> usize {
        self.declared_steps().map(<[FormStep]>::len).unwrap_or(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn minimal_definition_uses_defaults() {
        let form: FormDefinition = serde_json::from_value(json!({
            "id": "contact",
            "fields": []
        }))
        .expect("form");
        assert_eq!(form.design.layout, FormLayout::Vertical);
        assert_eq!(form.settings.submit_button_text, "Submit");
        assert_eq!(form.total_steps(), 1);
    }

    #[test]
    fn null_design_and_settings_keys_use_defaults() {
        let form: FormDefinition = serde_json::from_value(json!({
            "id": "contact",
            "name": null,
            "fields": null,
            "design": { "layout": null, "theme": null, "show_logo": null },
            "settings": {
                "submit_button_text": null,
                "success_message": null,
                "show_consent_checkbox": true,
                "consent_text": null
            },
            "steps": [{ "id": "s1", "name": null, "field_ids": null, "display_order": null }]
        }))
        .expect("form");
        assert_eq!(form.name, "");
        assert!(form.fields.is_empty());
        assert_eq!(form.design.layout, FormLayout::Vertical);
        assert_eq!(form.design.theme, "");
        assert_eq!(form.settings.submit_button_text, "Submit");
        assert_eq!(form.settings.success_message, "");
        assert_eq!(form.settings.consent_text(), DEFAULT_CONSENT_TEXT);
        assert_eq!(form.steps.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn custom_consent_text_wins() {
        let settings = FormSettings {
            consent_text: Some("Keep me posted".into()),
            ..FormSettings::default()
        };
        assert_eq!(settings.consent_text(), "Keep me posted");
    }

    #[test]
    fn steps_ignored_unless_multi_step() {
        let form: FormDefinition = serde_json::from_value(json!({
            "id": "contact",
            "is_multi_step": false,
            "steps": [{ "id": "s1", "name": "One", "field_ids": [] }]
        }))
        .expect("form");
        assert!(form.declared_steps().is_none());
        assert_eq!(form.total_steps(), 1);
    }
}
