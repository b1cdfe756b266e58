mod presenter;

use std::collections::{BTreeMap, BTreeSet};
use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use form_session::{
    CONSENT_KEY, ClientConfig, FormSession, FormTransport, FormsClient, SessionError,
    SubmitContext,
};
use form_spec::{
    FieldDefinition, FieldType, FormDefinition, FormValidator, MessageCatalog, MessageTemplates,
    NoRegions, RenderInput, RenderStatus, RendererRegistry, ValidationOutcome, ValueSnapshot,
    build_render_payload, definition_schema, is_required, layout_rows, parse_definition,
    render_json_ui, render_text, steps_for, visible_step_fields,
};
use presenter::{AnswerParseError, FillPresenter, PromptContext, Verbosity};
use serde_json::{Map, Number, Value};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

const BASE_URL_ENV: &str = "DYNFORM_BASE_URL";

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Dynamic form helper",
    long_about = "Validates, lays out and fills server-defined forms locally or against a forms API"
)]
struct Cli {
    /// JSON file with validation message template overrides.
    #[arg(long, global = true, value_name = "MESSAGES")]
    messages: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum RenderMode {
    Text,
    Json,
}

#[derive(clap::Args)]
struct RemoteArgs {
    /// Forms API base URL (defaults to DYNFORM_BASE_URL).
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,
    /// Request timeout in seconds.
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a value snapshot against a form definition.
    Validate {
        /// Path to the form definition JSON.
        #[arg(long, value_name = "FORM")]
        form: PathBuf,
        /// Path to the values JSON object.
        #[arg(long, value_name = "VALUES")]
        values: PathBuf,
        /// Only validate the visible fields of this zero-based step.
        #[arg(long)]
        step: Option<usize>,
        /// Print the outcome as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Show the step partition and row layout for a snapshot.
    Steps {
        #[arg(long, value_name = "FORM")]
        form: PathBuf,
        #[arg(long, value_name = "VALUES")]
        values: Option<PathBuf>,
    },
    /// Render one step as text or JSON UI.
    Render {
        #[arg(long, value_name = "FORM")]
        form: PathBuf,
        #[arg(long, value_name = "VALUES")]
        values: Option<PathBuf>,
        #[arg(long, default_value_t = 0)]
        step: usize,
        #[arg(long, value_enum, default_value_t = RenderMode::Text)]
        format: RenderMode,
    },
    /// Print the JSON Schema of the form definition document.
    Schema,
    /// Fill a local form step by step in a text shell.
    Fill {
        #[arg(long, value_name = "FORM")]
        form: PathBuf,
        /// Optional JSON file containing initial values.
        #[arg(long, value_name = "VALUES")]
        values: Option<PathBuf>,
        /// CAPTCHA token to attach when the form requires one.
        #[arg(long)]
        recaptcha_token: Option<String>,
        /// Show visible fields and help text.
        #[arg(long, alias = "debug")]
        verbose: bool,
        /// Also emit the final submission JSON.
        #[arg(long)]
        data_json: bool,
    },
    /// Fetch a form definition from the API.
    Fetch {
        #[arg(long)]
        form_id: String,
        #[command(flatten)]
        remote: RemoteArgs,
    },
    /// Validate and submit values to the API.
    Submit {
        #[arg(long)]
        form_id: String,
        #[arg(long, value_name = "VALUES")]
        values: PathBuf,
        /// Page the form is embedded on; used as referrer and UTM source.
        #[arg(long, value_name = "URL")]
        page_url: Option<String>,
        #[arg(long)]
        recaptcha_token: Option<String>,
        #[command(flatten)]
        remote: RemoteArgs,
    },
    /// Confirm a double opt-in token.
    Confirm {
        #[arg(long)]
        token: String,
        #[command(flatten)]
        remote: RemoteArgs,
    },
}

#[tokio::main]
async fn main() -> CliResult<()> {
    init_tracing();
    let cli = Cli::parse();
    let messages = load_messages(cli.messages.as_deref())?;
    match cli.command {
        Command::Validate {
            form,
            values,
            step,
            json,
        } => run_validate(&form, &values, step, json, messages),
        Command::Steps { form, values } => run_steps(&form, values.as_deref()),
        Command::Render {
            form,
            values,
            step,
            format,
        } => run_render(&form, values.as_deref(), step, format, messages),
        Command::Schema => {
            println!("{}", serde_json::to_string_pretty(&definition_schema())?);
            Ok(())
        }
        Command::Fill {
            form,
            values,
            recaptcha_token,
            verbose,
            data_json,
        } => run_fill(&form, values.as_deref(), recaptcha_token, verbose, data_json, messages),
        Command::Fetch { form_id, remote } => run_fetch(&form_id, &remote).await,
        Command::Submit {
            form_id,
            values,
            page_url,
            recaptcha_token,
            remote,
        } => {
            run_submit(
                &form_id,
                &values,
                page_url.as_deref(),
                recaptcha_token,
                &remote,
                messages,
            )
            .await
        }
        Command::Confirm { token, remote } => run_confirm(&token, &remote).await,
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .init();
}

fn load_messages(path: Option<&Path>) -> CliResult<Arc<MessageCatalog>> {
    let templates = match path {
        Some(path) => {
            let contents = fs::read_to_string(path)?;
            serde_json::from_str::<MessageTemplates>(&contents)?
        }
        None => MessageTemplates::default(),
    };
    Ok(Arc::new(MessageCatalog::new(templates)?))
}

fn load_form(path: &Path) -> CliResult<FormDefinition> {
    let contents = fs::read_to_string(path)?;
    let form = parse_definition(&contents)?;
    tracing::debug!(
        path = %path.display(),
        form = %form.id,
        fields = form.fields.len(),
        "loaded form definition"
    );
    Ok(form)
}

fn load_values(path: Option<&Path>) -> CliResult<ValueSnapshot> {
    let Some(path) = path else {
        return Ok(ValueSnapshot::new());
    };
    let contents = fs::read_to_string(path)?;
    match serde_json::from_str::<Value>(&contents)? {
        Value::Object(map) => Ok(map),
        _ => Err(format!("{} must contain a JSON object", path.display()).into()),
    }
}

fn run_validate(
    form_path: &Path,
    values_path: &Path,
    step: Option<usize>,
    json: bool,
    messages: Arc<MessageCatalog>,
) -> CliResult<()> {
    let form = load_form(form_path)?;
    let values = load_values(Some(values_path))?;
    let validator = FormValidator::compile_with(&form.fields, messages);

    let outcome = match step {
        Some(index) => {
            if index >= form.total_steps() {
                return Err(format!(
                    "form has {} step(s); step {} does not exist",
                    form.total_steps(),
                    index
                )
                .into());
            }
            let names: BTreeSet<String> = visible_step_fields(&form, index, &values)
                .iter()
                .map(|field| field.name.clone())
                .collect();
            validator.validate_only(&values, &names)
        }
        None => validator.validate(&values),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!(
            "Validation result: {}",
            if outcome.valid { "valid" } else { "invalid" }
        );
        describe_validation(&outcome);
    }

    if outcome.valid {
        Ok(())
    } else {
        Err("validation failed".into())
    }
}

fn describe_validation(outcome: &ValidationOutcome) {
    if !outcome.errors.is_empty() {
        println!("Errors:");
        for (name, message) in &outcome.errors {
            println!("  {} - {}", name, message);
        }
    }
}

fn run_steps(form_path: &Path, values_path: Option<&Path>) -> CliResult<()> {
    let form = load_form(form_path)?;
    let values = load_values(values_path)?;
    let total = form.total_steps();

    for view in steps_for(&form, &values) {
        println!("Step {}/{}: {} [{}]", view.index + 1, total, view.step.name, view.step.id);
        if view.fields.is_empty() {
            println!("  (no visible fields)");
            continue;
        }
        for row in layout_rows(&view.fields, form.design.layout) {
            let names: Vec<String> = row
                .iter()
                .map(|field| {
                    let mut name = format!("{} ({})", field.name, field.width.as_str());
                    if is_required(field, &values) {
                        name.push_str(" *");
                    }
                    name
                })
                .collect();
            println!("  {}", names.join(" | "));
        }
    }
    Ok(())
}

fn run_render(
    form_path: &Path,
    values_path: Option<&Path>,
    step: usize,
    format: RenderMode,
    messages: Arc<MessageCatalog>,
) -> CliResult<()> {
    let form = load_form(form_path)?;
    let values = load_values(values_path)?;
    let errors = if values_path.is_some() {
        let names: BTreeSet<String> = visible_step_fields(&form, step, &values)
            .iter()
            .map(|field| field.name.clone())
            .collect();
        FormValidator::compile_with(&form.fields, messages)
            .validate_only(&values, &names)
            .errors
    } else {
        BTreeMap::new()
    };

    let payload = build_render_payload(
        &RenderInput {
            form: &form,
            values: &values,
            current_step: step,
            errors: &errors,
            status: RenderStatus::Ready,
        },
        &RendererRegistry::with_defaults(),
        &NoRegions,
    );
    match format {
        RenderMode::Text => println!("{}", render_text(&payload)),
        RenderMode::Json => {
            println!("{}", serde_json::to_string_pretty(&render_json_ui(&payload))?)
        }
    }
    Ok(())
}

fn run_fill(
    form_path: &Path,
    values_path: Option<&Path>,
    recaptcha_token: Option<String>,
    verbose: bool,
    data_json: bool,
    messages: Arc<MessageCatalog>,
) -> CliResult<()> {
    let form = load_form(form_path)?;
    let initial = load_values(values_path)?;
    let mut session = FormSession::from_definition(form).with_messages(messages);
    for (name, value) in initial {
        session.set_value(name, value)?;
    }

    let registry = RendererRegistry::with_defaults();
    let mut presenter = FillPresenter::new(Verbosity::from_verbose(verbose), data_json);
    let mut context = SubmitContext::default();
    if let Some(token) = recaptcha_token {
        context = context.with_recaptcha_token(token);
    }

    loop {
        let payload = session
            .render_payload(&registry, &NoRegions)
            .ok_or("form session has no definition")?;
        presenter.show_header(&payload);
        presenter.show_step(&payload);
        prompt_step(&mut session, &presenter)?;

        if !session.is_last_step() {
            match session.next_step() {
                Ok(_) => {}
                Err(SessionError::Validation(errors)) => presenter.show_errors(&errors),
                Err(err) => return Err(err.into()),
            }
            continue;
        }

        let consent_text = session
            .definition()
            .filter(|form| form.settings.show_consent_checkbox)
            .map(|form| form.settings.consent_text().to_string());
        let consent_required = consent_text.is_some();
        if let Some(text) = consent_text {
            let agreed = prompt_bool(&text, false)?;
            session.set_value(CONSENT_KEY, Value::Bool(agreed))?;
        }

        match session.begin_submit(&context) {
            Ok(request) => {
                presenter.show_completion(&request);
                return Ok(());
            }
            Err(SessionError::Validation(errors)) => {
                presenter.show_errors(&errors);
                if let Some(step) = first_step_with_error(&session, &errors) {
                    session.go_to_step(step)?;
                }
                if errors.keys().all(|name| name.starts_with('_')) && !consent_required {
                    return Err("submission blocked; pass --recaptcha-token".into());
                }
            }
            Err(err) => return Err(err.into()),
        }
    }
}

fn first_step_with_error(
    session: &FormSession,
    errors: &BTreeMap<String, String>,
) -> Option<usize> {
    let form = session.definition()?;
    (0..form.total_steps()).find(|index| {
        visible_step_fields(form, *index, session.values())
            .iter()
            .any(|field| errors.contains_key(&field.name))
    })
}

/// Prompts every visible field of the current step once. Fields revealed by
/// an answer are prompted as they appear.
fn prompt_step(session: &mut FormSession, presenter: &FillPresenter) -> CliResult<()> {
    let mut prompted: BTreeSet<String> = BTreeSet::new();
    loop {
        let fields: Vec<FieldDefinition> = session.step_fields().into_iter().cloned().collect();
        let total = fields
            .iter()
            .filter(|field| !field.kind.is_display_only())
            .count();
        let Some((position, field)) = fields
            .iter()
            .filter(|field| !field.kind.is_display_only())
            .enumerate()
            .find(|(_, field)| !prompted.contains(&field.name))
        else {
            return Ok(());
        };
        prompted.insert(field.name.clone());

        let required = is_required(field, session.values());
        let prompt = PromptContext::new(field, required, position + 1, total);
        let current = session
            .values()
            .get(&field.name)
            .map(display_value)
            .filter(|text| !text.is_empty());
        loop {
            presenter.show_prompt(&prompt);
            let raw = prompt_line(">", current.as_deref())?;
            match parse_answer(field, &raw) {
                Ok(Some(value)) => {
                    session.set_value(field.name.clone(), value)?;
                    break;
                }
                Ok(None) => {
                    session.remove_value(&field.name)?;
                    break;
                }
                Err(err) => presenter.show_parse_error(&err),
            }
        }
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Bool(true) => "yes".to_string(),
        Value::Bool(false) => "no".to_string(),
        Value::Array(items) => items
            .iter()
            .map(display_value)
            .collect::<Vec<_>>()
            .join(","),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn parse_answer(field: &FieldDefinition, raw: &str) -> Result<Option<Value>, AnswerParseError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    match &field.kind {
        FieldType::Checkbox => parse_boolean(trimmed).map(Some),
        FieldType::Number => parse_number(trimmed).map(Some),
        FieldType::CheckboxGroup => Ok(Some(Value::Array(
            trimmed
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(|item| Value::String(item.to_string()))
                .collect(),
        ))),
        FieldType::File => serde_json::from_str::<Value>(trimmed)
            .map(Some)
            .map_err(|err| AnswerParseError::new("Enter the file as JSON.", Some(err.to_string()))),
        _ => Ok(Some(Value::String(trimmed.to_string()))),
    }
}

fn parse_boolean(raw: &str) -> Result<Value, AnswerParseError> {
    match raw.to_lowercase().as_str() {
        "y" | "yes" | "true" | "1" => Ok(Value::Bool(true)),
        "n" | "no" | "false" | "0" => Ok(Value::Bool(false)),
        other => Err(AnswerParseError::new(
            format!("'{}' is not yes or no", other),
            Some("yes/no, y/n, true/false".to_string()),
        )),
    }
}

fn parse_number(raw: &str) -> Result<Value, AnswerParseError> {
    if let Ok(int_val) = raw.parse::<i64>() {
        return Ok(Value::Number(Number::from(int_val)));
    }
    raw.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| AnswerParseError::new(format!("'{}' is not a number", raw), None))
}

fn prompt_line(prompt: &str, default: Option<&str>) -> CliResult<String> {
    if let Some(default_value) = default {
        print!("{} [{}]: ", prompt, default_value);
    } else {
        print!("{} ", prompt);
    }
    io::stdout().flush()?;
    let mut line = String::new();
    if io::stdin().read_line(&mut line)? == 0 {
        return Err("input closed before the form was completed".into());
    }
    let trimmed = line.trim();
    if trimmed.is_empty() {
        Ok(default.unwrap_or_default().to_string())
    } else {
        Ok(trimmed.to_string())
    }
}

fn prompt_bool(prompt: &str, default: bool) -> CliResult<bool> {
    let prompt_text = format!("{} (y/n)", prompt.trim());
    let default_hint = if default { "Y" } else { "N" };
    loop {
        let line = prompt_line(&prompt_text, Some(default_hint))?;
        match parse_boolean(&line) {
            Ok(Value::Bool(value)) => return Ok(value),
            _ => println!("Invalid answer '{}'. Expected yes or no.", line),
        }
    }
}

fn resolve_base_url(remote: &RemoteArgs) -> CliResult<String> {
    remote
        .base_url
        .clone()
        .or_else(|| env::var(BASE_URL_ENV).ok())
        .filter(|url| !url.trim().is_empty())
        .ok_or_else(|| format!("missing --base-url (or {})", BASE_URL_ENV).into())
}

fn build_client(remote: &RemoteArgs) -> CliResult<FormsClient> {
    let config = ClientConfig {
        base_url: resolve_base_url(remote)?,
        timeout: Duration::from_secs(remote.timeout_secs),
        ..ClientConfig::default()
    };
    Ok(FormsClient::with_config(config)?)
}

async fn run_fetch(form_id: &str, remote: &RemoteArgs) -> CliResult<()> {
    let client = build_client(remote)?;
    let form = client.fetch_form(form_id).await?;
    println!("{}", serde_json::to_string_pretty(&form)?);
    Ok(())
}

async fn run_submit(
    form_id: &str,
    values_path: &Path,
    page_url: Option<&str>,
    recaptcha_token: Option<String>,
    remote: &RemoteArgs,
    messages: Arc<MessageCatalog>,
) -> CliResult<()> {
    let client = build_client(remote)?;
    let values = load_values(Some(values_path))?;

    let mut session = FormSession::new(form_id).with_messages(messages);
    session.load(&client).await?;
    for (name, value) in values {
        session.set_value(name, value)?;
    }

    let mut context = match page_url {
        Some(url) => SubmitContext::from_page_url(url)?,
        None => SubmitContext::default(),
    };
    if let Some(token) = recaptcha_token {
        context = context.with_recaptcha_token(token);
    }

    match session.submit(&client, &context).await {
        Ok(response) => {
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
        Err(SessionError::Validation(errors)) => {
            println!("Validation result: invalid");
            describe_validation(&ValidationOutcome {
                valid: false,
                errors,
                data: Map::new(),
            });
            Err("validation failed".into())
        }
        Err(err) => Err(err.into()),
    }
}

async fn run_confirm(token: &str, remote: &RemoteArgs) -> CliResult<()> {
    let client = build_client(remote)?;
    let response = client.confirm_opt_in(token).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_cmd::Command;
    use serde_json::json;
    use tempfile::TempDir;

    const CONTACT: &str = include_str!("../../form-spec/tests/fixtures/contact_form.json");
    const MULTI_STEP: &str = include_str!("../../form-spec/tests/fixtures/multi_step.json");

    fn field(value: Value) -> FieldDefinition {
        serde_json::from_value(value).expect("field")
    }

    fn dynform() -> Command {
        let mut cmd = Command::cargo_bin("dynform").expect("binary");
        cmd.env_remove(BASE_URL_ENV).env_remove("RUST_LOG");
        cmd
    }

    #[test]
    fn parse_answer_follows_field_type() {
        let checkbox = field(json!({ "id": "1", "name": "ok", "field_type": "checkbox" }));
        assert_eq!(parse_answer(&checkbox, "yes").expect("parse"), Some(Value::Bool(true)));
        assert!(parse_answer(&checkbox, "maybe").is_err());

        let number = field(json!({ "id": "2", "name": "n", "field_type": "number" }));
        assert_eq!(parse_answer(&number, "12").expect("parse"), Some(json!(12)));
        assert_eq!(parse_answer(&number, "1.5").expect("parse"), Some(json!(1.5)));
        assert!(parse_answer(&number, "twelve").is_err());

        let group = field(json!({ "id": "3", "name": "g", "field_type": "checkbox_group" }));
        assert_eq!(
            parse_answer(&group, "email, chat,").expect("parse"),
            Some(json!(["email", "chat"]))
        );
        assert_eq!(parse_answer(&group, "  ").expect("parse"), None);
    }

    #[test]
    fn validate_command_reports_errors() {
        let temp = TempDir::new().expect("temp dir");
        let form = temp.path().join("form.json");
        fs::write(&form, CONTACT).expect("write form");
        let values = temp.path().join("values.json");
        fs::write(&values, json!({ "first_name": "A", "country": "US" }).to_string())
            .expect("write values");

        let output = dynform()
            .args(["validate", "--form"])
            .arg(&form)
            .arg("--values")
            .arg(&values)
            .output()
            .expect("run");
        assert!(!output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("Validation result: invalid"));
        assert!(stdout.contains("first_name - First name must be at least 2 characters"));
        assert!(stdout.contains("state - State is required"));
    }

    #[test]
    fn validate_command_accepts_step_subset() {
        let temp = TempDir::new().expect("temp dir");
        let form = temp.path().join("form.json");
        fs::write(&form, MULTI_STEP).expect("write form");
        let values = temp.path().join("values.json");
        fs::write(&values, r#"{ "email": "a@b.com" }"#).expect("write values");

        let output = dynform()
            .args(["validate", "--step", "0", "--json", "--form"])
            .arg(&form)
            .arg("--values")
            .arg(&values)
            .output()
            .expect("run");
        assert!(output.status.success());
        let outcome: Value = serde_json::from_slice(&output.stdout).expect("json");
        assert_eq!(outcome["valid"], true);
        assert_eq!(outcome["data"]["email"], "a@b.com");
    }

    #[test]
    fn steps_command_prints_packed_rows() {
        let temp = TempDir::new().expect("temp dir");
        let form = temp.path().join("form.json");
        fs::write(&form, CONTACT).expect("write form");

        let output = dynform()
            .args(["steps", "--form"])
            .arg(&form)
            .output()
            .expect("run");
        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("Step 1/1: Contact us [default]"));
        assert!(stdout.contains("first_name (half) * | last_name (half)"));
    }

    #[test]
    fn fill_walks_steps_until_submission() {
        let temp = TempDir::new().expect("temp dir");
        let form = temp.path().join("form.json");
        fs::write(&form, MULTI_STEP).expect("write form");

        let output = dynform()
            .args(["fill", "--data-json", "--form"])
            .arg(&form)
            .write_stdin("\na@b.com\nAcme\n7\nchat\n")
            .output()
            .expect("run");
        assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("email - Email is required"));
        assert!(stdout.contains("Step 2/2: Company (100%)"));
        assert!(stdout.contains("Done ✅"));
        assert!(stdout.contains("\"team_size\": 7"));
        assert!(stdout.contains("\"channels\": ["));
    }

    #[test]
    fn remote_commands_need_a_base_url() {
        let output = dynform()
            .args(["fetch", "--form-id", "contact"])
            .output()
            .expect("run");
        assert!(!output.status.success());
        assert!(String::from_utf8_lossy(&output.stderr).contains("missing --base-url"));
    }

    #[test]
    fn schema_command_prints_definition_schema() {
        let output = dynform().arg("schema").output().expect("run");
        assert!(output.status.success());
        let schema: Value = serde_json::from_slice(&output.stdout).expect("json");
        assert!(schema["properties"]["fields"].is_object());
    }
}
