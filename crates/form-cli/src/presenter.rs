use std::collections::BTreeMap;

use form_session::SubmitFormRequest;
use form_spec::{FieldDefinition, FieldType, RenderPayload};

/// Controls which bits of state the fill loop prints.
#[derive(Copy, Clone, Eq, PartialEq)]
pub enum Verbosity {
    /// Clean output: step headers and prompts only.
    Clean,
    /// Verbose output: visible fields, required markers, help text.
    Verbose,
}

impl Verbosity {
    pub fn from_verbose(verbose: bool) -> Self {
        if verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Clean
        }
    }

    pub fn is_verbose(&self) -> bool {
        matches!(self, Verbosity::Verbose)
    }
}

/// Prints step headers, prompts and outcomes of an interactive fill.
pub struct FillPresenter {
    verbosity: Verbosity,
    header_printed: bool,
    show_data_json: bool,
}

impl FillPresenter {
    pub fn new(verbosity: Verbosity, show_data_json: bool) -> Self {
        Self {
            verbosity,
            header_printed: false,
            show_data_json,
        }
    }

    pub fn show_header(&mut self, payload: &RenderPayload) {
        if self.header_printed {
            return;
        }
        println!("Form: {}", payload.form_name);
        if let Some(description) = &payload.description {
            println!("{}", description);
        }
        self.header_printed = true;
    }

    pub fn show_step(&self, payload: &RenderPayload) {
        let step = &payload.step;
        if step.total > 1 {
            println!(
                "Step {}/{}: {} ({}%)",
                step.index + 1,
                step.total,
                step.name,
                step.progress
            );
            if let Some(description) = &step.description {
                println!("{}", description);
            }
        }
        if self.verbosity.is_verbose() {
            println!("Visible fields:");
            for widget in payload.rows.iter().flatten() {
                let name = widget.get("name").and_then(|name| name.as_str()).unwrap_or_default();
                let mut entry = format!(" - {}", name);
                if widget.get("required").and_then(|flag| flag.as_bool()) == Some(true) {
                    entry.push_str(" [required]");
                }
                println!("{}", entry);
            }
        } else if payload.rows.is_empty() {
            println!("No visible fields on this step; check your conditional logic.");
        }
    }

    pub fn show_prompt(&self, prompt: &PromptContext) {
        let mut line = format!("{}/{} {}", prompt.index, prompt.total, prompt.label);
        if prompt.required {
            line.push_str(" *");
        }
        if let Some(hint) = &prompt.hint {
            line.push(' ');
            line.push_str(hint);
        }
        println!("{}", line);
        if self.verbosity.is_verbose()
            && let Some(help) = &prompt.help_text
        {
            println!("{}", help);
        }
    }

    pub fn show_parse_error(&self, error: &AnswerParseError) {
        eprintln!("Invalid answer: {}", error.user_message);
        if let Some(debug) = &error.debug_message {
            eprintln!("  Expected: {}", debug);
        }
    }

    pub fn show_errors(&self, errors: &BTreeMap<String, String>) {
        eprintln!("Please fix the following:");
        for (name, message) in errors {
            eprintln!("  {} - {}", name, message);
        }
    }

    pub fn show_completion(&self, request: &SubmitFormRequest) {
        println!("Done ✅");
        println!("Submitted fields: {}", request.data.len());
        if self.show_data_json {
            match serde_json::to_string_pretty(request) {
                Ok(pretty) => println!("{}", pretty),
                Err(err) => eprintln!("Failed to serialize submission to JSON: {}", err),
            }
        }
    }
}

/// Context used to format a single prompt.
pub struct PromptContext {
    pub index: usize,
    pub total: usize,
    pub label: String,
    pub help_text: Option<String>,
    pub required: bool,
    pub hint: Option<String>,
}

impl PromptContext {
    pub fn new(field: &FieldDefinition, required: bool, index: usize, total: usize) -> Self {
        let label = if field.label.trim().is_empty() {
            field.name.clone()
        } else {
            field.label.clone()
        };
        Self {
            index,
            total,
            label,
            help_text: field.help_text.clone(),
            required,
            hint: hint_for(field),
        }
    }
}

fn hint_for(field: &FieldDefinition) -> Option<String> {
    let choices: Vec<&str> = field
        .options
        .iter()
        .flat_map(|options| options.options.iter())
        .map(|option| option.value.as_str())
        .collect();
    match &field.kind {
        FieldType::Checkbox => Some("(yes/no)".to_string()),
        FieldType::Number => Some("(number)".to_string()),
        FieldType::Date => Some("(YYYY-MM-DD)".to_string()),
        FieldType::Time => Some("(HH:MM)".to_string()),
        FieldType::Datetime => Some("(YYYY-MM-DDTHH:MM)".to_string()),
        FieldType::File => Some("(JSON: {\"name\", \"type\", \"size\"})".to_string()),
        FieldType::CheckboxGroup if !choices.is_empty() => {
            Some(format!("(comma separated: {})", choices.join("/")))
        }
        FieldType::Select | FieldType::Radio if !choices.is_empty() => {
            Some(format!("({})", choices.join("/")))
        }
        _ => None,
    }
}

/// Error produced when parsing answers from the user.
#[derive(Debug)]
pub struct AnswerParseError {
    pub user_message: String,
    pub debug_message: Option<String>,
}

impl AnswerParseError {
    pub fn new(user_message: impl Into<String>, debug_message: Option<String>) -> Self {
        Self {
            user_message: user_message.into(),
            debug_message,
        }
    }
}
