use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, LazyLock};

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use url::Url;

use crate::condition::{ValueSnapshot, coerce_string, is_empty, parse_numeric};
use crate::messages::{MessageCatalog, MessageKey};
use crate::spec::field::{FieldDefinition, FieldType};
use crate::visibility::{is_required, is_visible};

static EMAIL_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)^[a-z0-9_'+\-.]*[a-z0-9_+\-]@([a-z0-9][a-z0-9\-]*\.)+[a-z]{2,}$").ok()
});

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Metadata of an uploaded file as carried in the value snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileValue {
    pub name: String,
    #[serde(rename = "type", default)]
    pub mime: String,
    #[serde(default)]
    pub size: u64,
}

/// Result of running a compiled validator over a snapshot.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub errors: BTreeMap<String, String>,
    /// Normalized values of the validated fields; blank optional values are omitted.
    pub data: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Temporal {
    Date,
    Time,
    DateTime,
}

#[derive(Debug, Clone)]
struct FileTypes {
    mime: GlobSet,
    names: GlobSet,
}

impl FileTypes {
    fn compile(types: &[String]) -> Option<Self> {
        let listed: Vec<String> = types
            .iter()
            .map(|kind| kind.trim().to_string())
            .filter(|kind| !kind.is_empty())
            .collect();
        if listed.is_empty() {
            return None;
        }
        let mut mime = GlobSetBuilder::new();
        let mut names = GlobSetBuilder::new();
        for kind in &listed {
            let (target, pattern) = if kind.contains('/') {
                (&mut mime, kind.clone())
            } else {
                (&mut names, format!("*.{}", kind.trim_start_matches('.')))
            };
            match GlobBuilder::new(&pattern).case_insensitive(true).build() {
                Ok(glob) => {
                    target.add(glob);
                }
                Err(err) => tracing::warn!(
                    allowed_type = %kind,
                    error = %err,
                    "ignoring unusable file type"
                ),
            }
        }
        let mime = mime.build().unwrap_or_else(|_| GlobSet::empty());
        let names = names.build().unwrap_or_else(|_| GlobSet::empty());
        Some(Self { mime, names })
    }

    fn accepts(&self, file: &FileValue) -> bool {
        (!file.mime.is_empty() && self.mime.is_match(&file.mime)) || self.names.is_match(&file.name)
    }
}

#[derive(Debug, Clone)]
enum FieldRule {
    Text {
        min_length: Option<usize>,
        max_length: Option<usize>,
        pattern: Option<Regex>,
    },
    Email,
    Phone,
    Url,
    Number {
        min: Option<f64>,
        max: Option<f64>,
    },
    Temporal(Temporal),
    Choice {
        allowed: Option<BTreeSet<String>>,
    },
    Checkbox,
    CheckboxGroup {
        allowed: Option<BTreeSet<String>>,
    },
    File {
        types: Option<FileTypes>,
        max_bytes: Option<f64>,
    },
    Any,
}

#[derive(Debug, Clone)]
struct CompiledField {
    field: FieldDefinition,
    rule: FieldRule,
}

/// Executable validator compiled from a field list.
#[derive(Debug, Clone)]
pub struct FormValidator {
    fields: Vec<CompiledField>,
    messages: Arc<MessageCatalog>,
}

impl FormValidator {
    /// Compiles with the default message templates.
    pub fn compile<'a, I>(fields: I) -> Self
    where
        I: IntoIterator<Item = &'a FieldDefinition>,
    {
        Self::compile_with(fields, Arc::new(MessageCatalog::default()))
    }

    /// One sub-validator per active, input-bearing field. Never fails.
    pub fn compile_with<'a, I>(fields: I, messages: Arc<MessageCatalog>) -> Self
    where
        I: IntoIterator<Item = &'a FieldDefinition>,
    {
        let fields = fields
            .into_iter()
            .filter(|field| field.is_active && !field.kind.is_display_only())
            .map(|field| CompiledField {
                rule: compile_rule(field),
                field: field.clone(),
            })
            .collect();
        Self { fields, messages }
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|compiled| compiled.field.name.as_str())
    }

    pub fn messages(&self) -> &MessageCatalog {
        &self.messages
    }

    /// Validates every compiled field.
    pub fn validate(&self, values: &ValueSnapshot) -> ValidationOutcome {
        self.run(values, |_| true)
    }

    /// Validates only the named fields, e.g. the fields of the current step.
    pub fn validate_only(
        &self,
        values: &ValueSnapshot,
        names: &BTreeSet<String>,
    ) -> ValidationOutcome {
        self.run(values, |name| names.contains(name))
    }

    fn run(&self, values: &ValueSnapshot, include: impl Fn(&str) -> bool) -> ValidationOutcome {
        let mut errors = BTreeMap::new();
        let mut data = Map::new();

        for compiled in &self.fields {
            let field = &compiled.field;
            if !include(&field.name) || !is_visible(field, values) {
                continue;
            }
            let required = is_required(field, values);
            match self.check(compiled, values.get(&field.name), required) {
                Ok(Some(value)) => {
                    data.insert(field.name.clone(), value);
                }
                Ok(None) => {}
                Err(message) => {
                    errors.insert(field.name.clone(), message);
                }
            }
        }

        tracing::debug!(errors = errors.len(), fields = data.len(), "validated snapshot");
        ValidationOutcome {
            valid: errors.is_empty(),
            errors,
            data,
        }
    }

    /// Blank input is settled by the required/optional wrapping; anything else
    /// must satisfy the type rule.
    fn check(
        &self,
        compiled: &CompiledField,
        raw: Option<&Value>,
        required: bool,
    ) -> Result<Option<Value>, String> {
        let field = &compiled.field;
        let msg = |key: MessageKey| self.messages.for_field(key, field);

        match &compiled.rule {
            FieldRule::Any => return Ok(raw.filter(|value| !value.is_null()).cloned()),
            FieldRule::Checkbox => {
                return match raw {
                    Some(Value::Bool(true)) => Ok(Some(Value::Bool(true))),
                    _ if required => Err(msg(MessageKey::CheckboxRequired)),
                    None | Some(Value::Null) => Ok(None),
                    Some(Value::Bool(false)) => Ok(Some(Value::Bool(false))),
                    Some(_) => Err(msg(MessageKey::TypeMismatch)),
                };
            }
            _ => {}
        }

        if is_empty(raw) {
            return if !required {
                Ok(None)
            } else if matches!(compiled.rule, FieldRule::CheckboxGroup { .. }) {
                Err(msg(MessageKey::SelectAtLeastOne))
            } else {
                Err(msg(MessageKey::Required))
            };
        }
        let Some(value) = raw else {
            return Ok(None);
        };

        match &compiled.rule {
            FieldRule::Text {
                min_length,
                max_length,
                pattern,
            } => {
                let text = as_text(value).ok_or_else(|| msg(MessageKey::TypeMismatch))?;
                let length = text.chars().count();
                if let Some(min) = min_length
                    && length < *min
                {
                    return Err(msg(MessageKey::MinLength));
                }
                if let Some(max) = max_length
                    && length > *max
                {
                    return Err(msg(MessageKey::MaxLength));
                }
                if let Some(regex) = pattern
                    && !regex.is_match(&text)
                {
                    return Err(msg(MessageKey::Pattern));
                }
                Ok(Some(Value::String(text)))
            }
            FieldRule::Email => {
                let text = as_text(value).ok_or_else(|| msg(MessageKey::TypeMismatch))?;
                if is_email(&text) {
                    Ok(Some(Value::String(text)))
                } else {
                    Err(msg(MessageKey::Email))
                }
            }
            FieldRule::Phone => {
                let text = as_text(value).ok_or_else(|| msg(MessageKey::TypeMismatch))?;
                let digits = text.chars().filter(char::is_ascii_digit).count();
                if digits >= 10 {
                    Ok(Some(Value::String(text)))
                } else {
                    Err(msg(MessageKey::Phone))
                }
            }
            FieldRule::Url => {
                let text = as_text(value).ok_or_else(|| msg(MessageKey::TypeMismatch))?;
                match Url::parse(&text) {
                    Ok(_) => Ok(Some(Value::String(text))),
                    Err(_) => Err(msg(MessageKey::Url)),
                }
            }
            FieldRule::Number { min, max } => {
                let number = coerce_number(value);
                if number.is_nan() {
                    return Err(msg(MessageKey::Number));
                }
                if let Some(min) = min
                    && number < *min
                {
                    return Err(msg(MessageKey::Min));
                }
                if let Some(max) = max
                    && number > *max
                {
                    return Err(msg(MessageKey::Max));
                }
                number_value(number)
                    .map(Some)
                    .ok_or_else(|| msg(MessageKey::Number))
            }
            FieldRule::Temporal(kind) => {
                let text = as_text(value).ok_or_else(|| msg(MessageKey::TypeMismatch))?;
                let (parsed, key) = match kind {
                    Temporal::Date => (parses_date(&text), MessageKey::Date),
                    Temporal::Time => (parses_time(&text), MessageKey::Time),
                    Temporal::DateTime => (parses_datetime(&text), MessageKey::Datetime),
                };
                if parsed {
                    Ok(Some(Value::String(text)))
                } else {
                    Err(msg(key))
                }
            }
            FieldRule::Choice { allowed } => {
                let text = as_text(value).ok_or_else(|| msg(MessageKey::TypeMismatch))?;
                if let Some(allowed) = allowed
                    && !allowed.contains(&text)
                {
                    return Err(msg(MessageKey::Option));
                }
                Ok(Some(Value::String(text)))
            }
            FieldRule::CheckboxGroup { allowed } => {
                let selected = as_text_list(value).ok_or_else(|| msg(MessageKey::TypeMismatch))?;
                if let Some(allowed) = allowed
                    && !selected.iter().all(|item| allowed.contains(item))
                {
                    return Err(msg(MessageKey::Options));
                }
                Ok(Some(Value::Array(
                    selected.into_iter().map(Value::String).collect(),
                )))
            }
            FieldRule::File { types, max_bytes } => {
                let files = as_files(value).ok_or_else(|| msg(MessageKey::TypeMismatch))?;
                if let Some(types) = types
                    && !files.iter().all(|file| types.accepts(file))
                {
                    return Err(msg(MessageKey::FileType));
                }
                if let Some(limit) = max_bytes
                    && files.iter().any(|file| file.size as f64 > *limit)
                {
                    return Err(msg(MessageKey::FileSize));
                }
                Ok(Some(value.clone()))
            }
            FieldRule::Checkbox | FieldRule::Any => Ok(Some(value.clone())),
        }
    }
}

fn compile_rule(field: &FieldDefinition) -> FieldRule {
    let rules = field.rules();
    let choice_set = || {
        field
            .options
            .as_ref()
            .filter(|options| !options.allow_other)
            .map(|options| {
                options
                    .options
                    .iter()
                    .map(|option| option.value.clone())
                    .collect::<BTreeSet<_>>()
            })
    };

    match &field.kind {
        FieldType::Text | FieldType::Textarea | FieldType::Hidden => FieldRule::Text {
            min_length: rules.and_then(|rules| rules.min_length).filter(|min| *min > 0),
            max_length: rules.and_then(|rules| rules.max_length).filter(|max| *max > 0),
            pattern: rules
                .and_then(|rules| rules.pattern.as_deref())
                .filter(|pattern| !pattern.is_empty())
                .and_then(|pattern| match Regex::new(pattern) {
                    Ok(regex) => Some(regex),
                    Err(err) => {
                        tracing::warn!(
                            field = %field.name,
                            pattern,
                            error = %err,
                            "ignoring invalid pattern"
                        );
                        None
                    }
                }),
        },
        FieldType::Email => FieldRule::Email,
        FieldType::Phone => FieldRule::Phone,
        FieldType::Url => FieldRule::Url,
        FieldType::Number => FieldRule::Number {
            min: rules.and_then(|rules| rules.min),
            max: rules.and_then(|rules| rules.max),
        },
        FieldType::Date => FieldRule::Temporal(Temporal::Date),
        FieldType::Time => FieldRule::Temporal(Temporal::Time),
        FieldType::Datetime => FieldRule::Temporal(Temporal::DateTime),
        FieldType::Select | FieldType::Radio | FieldType::Country | FieldType::State => {
            FieldRule::Choice {
                allowed: choice_set(),
            }
        }
        FieldType::Checkbox => FieldRule::Checkbox,
        FieldType::CheckboxGroup => FieldRule::CheckboxGroup {
            allowed: choice_set(),
        },
        FieldType::File => FieldRule::File {
            types: rules
                .and_then(|rules| rules.allowed_types.as_deref())
                .and_then(FileTypes::compile),
            max_bytes: rules
                .and_then(|rules| rules.max_file_size)
                .filter(|size| *size > 0.0)
                .map(|size| size * BYTES_PER_MB),
        },
        FieldType::Html | FieldType::Divider | FieldType::Recaptcha => FieldRule::Any,
        FieldType::Other(name) => {
            tracing::warn!(
                field = %field.name,
                field_type = %name,
                "unknown field type accepts any value"
            );
            FieldRule::Any
        }
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(_) | Value::Bool(_) => Some(coerce_string(Some(value))),
        _ => None,
    }
}

fn as_text_list(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string))
            .collect(),
        Value::String(text) => Some(vec![text.clone()]),
        _ => None,
    }
}

fn as_files(value: &Value) -> Option<Vec<FileValue>> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| serde_json::from_value(item.clone()).ok())
            .collect(),
        Value::Object(_) => serde_json::from_value(value.clone()).ok().map(|file| vec![file]),
        _ => None,
    }
}

fn coerce_number(value: &Value) -> f64 {
    match value {
        Value::Number(number) => number.as_f64().unwrap_or(f64::NAN),
        Value::String(text) => parse_numeric(text),
        Value::Bool(flag) => {
            if *flag {
                1.0
            } else {
                0.0
            }
        }
        _ => f64::NAN,
    }
}

fn number_value(number: f64) -> Option<Value> {
    if number.fract() == 0.0 && number.abs() < 9.0e15 {
        return Some(Value::Number(Number::from(number as i64)));
    }
    Number::from_f64(number).map(Value::Number)
}

fn is_email(text: &str) -> bool {
    if text.starts_with('.') || text.contains("..") {
        return false;
    }
    EMAIL_RE.as_ref().is_some_and(|regex| regex.is_match(text))
}

fn parses_date(text: &str) -> bool {
    NaiveDate::parse_from_str(text, "%Y-%m-%d").is_ok() || parses_datetime(text)
}

fn parses_time(text: &str) -> bool {
    ["%H:%M", "%H:%M:%S", "%H:%M:%S%.f"]
        .iter()
        .any(|format| NaiveTime::parse_from_str(text, format).is_ok())
}

fn parses_datetime(text: &str) -> bool {
    DateTime::parse_from_rfc3339(text).is_ok()
        || [
            "%Y-%m-%dT%H:%M",
            "%Y-%m-%dT%H:%M:%S",
            "%Y-%m-%dT%H:%M:%S%.f",
            "%Y-%m-%d %H:%M",
            "%Y-%m-%d %H:%M:%S",
        ]
        .iter()
        .any(|format| NaiveDateTime::parse_from_str(text, format).is_ok())
}
