use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use form_spec::{
    FieldDefinition, FormDefinition, FormValidator, MessageCatalog, MessageKey, RegionDirectory,
    RenderInput, RenderPayload, RenderStatus, RendererRegistry, ValueSnapshot, VisibilityMap,
    build_render_payload, progress_percent, required_names, resolve_visibility, step_at,
    visible_fields, visible_step_fields,
};
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::transport::{
    FormTransport, SubmitFormRequest, SubmitFormResponse, TransportError, UtmParameters,
};

/// Snapshot key of the consent checkbox.
pub const CONSENT_KEY: &str = "_consent";
/// Snapshot key of a CAPTCHA token supplied through the form itself.
pub const RECAPTCHA_TOKEN_KEY: &str = "_recaptcha_token";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("form session is not ready")]
    NotReady,
    #[error("validation failed for {} field(s)", .0.len())]
    Validation(BTreeMap<String, String>),
    #[error("a submission is already in flight")]
    SubmitInFlight,
    #[error("form was already submitted")]
    AlreadySubmitted,
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("session '{0}' was closed")]
    Closed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Loading,
    Ready,
    Submitting,
    Success,
    Error,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Loading => "loading",
            SessionStatus::Ready => "ready",
            SessionStatus::Submitting => "submitting",
            SessionStatus::Success => "success",
            SessionStatus::Error => "error",
        }
    }
}

/// Page-level data sent along with a submission.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubmitContext {
    pub referrer: Option<String>,
    pub utm_parameters: Option<UtmParameters>,
    pub recaptcha_token: Option<String>,
    pub honeypot: Option<String>,
}

impl SubmitContext {
    /// Context for a form embedded on `page_url`: the URL becomes the referrer
    /// and its `utm_*` query parameters are collected.
    pub fn from_page_url(page_url: &str) -> Result<Self, url::ParseError> {
        let url = Url::parse(page_url)?;
        Ok(Self {
            referrer: Some(page_url.to_string()),
            utm_parameters: UtmParameters::from_url(&url),
            ..Self::default()
        })
    }

    pub fn with_recaptcha_token(mut self, token: impl Into<String>) -> Self {
        self.recaptcha_token = Some(token.into());
        self
    }
}

/// Lifecycle callbacks. Called while the session is borrowed, so
/// implementations must not call back into the same session.
pub trait SessionObserver: Send + Sync {
    fn on_step_change(&self, _step: usize, _total: usize) {}
    fn on_success(&self, _response: &SubmitFormResponse) {}
    fn on_error(&self, _error: &TransportError) {}
    fn on_validation_error(&self, _errors: &BTreeMap<String, String>) {}
}

/// State of one embedded form: definition, value snapshot, current step
/// and submission status.
pub struct FormSession {
    form_id: String,
    status: SessionStatus,
    definition: Option<Arc<FormDefinition>>,
    validator: Option<FormValidator>,
    messages: Arc<MessageCatalog>,
    values: ValueSnapshot,
    errors: BTreeMap<String, String>,
    current_step: usize,
    last_error: Option<String>,
    response: Option<SubmitFormResponse>,
    observer: Option<Arc<dyn SessionObserver>>,
}

impl FormSession {
    pub fn new(form_id: impl Into<String>) -> Self {
        Self {
            form_id: form_id.into(),
            status: SessionStatus::Loading,
            definition: None,
            validator: None,
            messages: Arc::new(MessageCatalog::default()),
            values: ValueSnapshot::new(),
            errors: BTreeMap::new(),
            current_step: 0,
            last_error: None,
            response: None,
            observer: None,
        }
    }

    /// Session over an already available definition.
    pub fn from_definition(definition: FormDefinition) -> Self {
        let mut session = Self::new(definition.id.clone());
        session.apply_definition(definition);
        session
    }

    pub fn with_messages(mut self, messages: Arc<MessageCatalog>) -> Self {
        self.messages = messages;
        if let Some(definition) = &self.definition {
            self.validator = Some(FormValidator::compile_with(
                &definition.fields,
                Arc::clone(&self.messages),
            ));
        }
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn form_id(&self) -> &str {
        &self.form_id
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn definition(&self) -> Option<&FormDefinition> {
        self.definition.as_deref()
    }

    pub fn values(&self) -> &ValueSnapshot {
        &self.values
    }

    pub fn errors(&self) -> &BTreeMap<String, String> {
        &self.errors
    }

    /// Last transport failure, if any.
    pub fn error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn response(&self) -> Option<&SubmitFormResponse> {
        self.response.as_ref()
    }

    /// Fetches the definition; a failure is terminal for the session.
    pub async fn load(&mut self, transport: &dyn FormTransport) -> Result<(), SessionError> {
        if self.status != SessionStatus::Loading {
            return Err(SessionError::NotReady);
        }
        match transport.fetch_form(&self.form_id).await {
            Ok(definition) => {
                self.apply_definition(definition);
                Ok(())
            }
            Err(err) => Err(self.fail_load(err)),
        }
    }

    /// Moves a loading session to `ready`: compiles the validator and seeds
    /// default values.
    pub fn apply_definition(&mut self, definition: FormDefinition) {
        if self.status != SessionStatus::Loading {
            tracing::warn!(
                form = %self.form_id,
                status = self.status.as_str(),
                "ignoring definition for a session that is not loading"
            );
            return;
        }
        self.validator = Some(FormValidator::compile_with(
            &definition.fields,
            Arc::clone(&self.messages),
        ));
        self.values = initial_values(&definition);
        self.definition = Some(Arc::new(definition));
        self.current_step = 0;
        self.status = SessionStatus::Ready;
        tracing::info!(form = %self.form_id, steps = self.total_steps(), "form session ready");
    }

    /// Records a failed fetch and returns the error to hand back to callers.
    pub fn fail_load(&mut self, err: TransportError) -> SessionError {
        tracing::warn!(form = %self.form_id, error = %err, "failed to load form");
        self.status = SessionStatus::Error;
        self.last_error = Some(err.to_api_error().error);
        if let Some(observer) = &self.observer {
            observer.on_error(&err);
        }
        SessionError::Transport(err)
    }

    fn ensure_editable(&self) -> Result<&Arc<FormDefinition>, SessionError> {
        match (self.status, &self.definition) {
            (SessionStatus::Success, _) => Err(SessionError::AlreadySubmitted),
            (SessionStatus::Ready | SessionStatus::Submitting, Some(definition)) => Ok(definition),
            _ => Err(SessionError::NotReady),
        }
    }

    /// Sets one value and clears its pending error message.
    pub fn set_value(&mut self, name: impl Into<String>, value: Value) -> Result<(), SessionError> {
        self.ensure_editable()?;
        let name = name.into();
        self.errors.remove(&name);
        self.values.insert(name, value);
        Ok(())
    }

    pub fn remove_value(&mut self, name: &str) -> Result<Option<Value>, SessionError> {
        self.ensure_editable()?;
        self.errors.remove(name);
        Ok(self.values.remove(name))
    }

    pub fn total_steps(&self) -> usize {
        self.definition
            .as_deref()
            .map(FormDefinition::total_steps)
            .unwrap_or(1)
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn is_first_step(&self) -> bool {
        self.current_step == 0
    }

    pub fn is_last_step(&self) -> bool {
        self.current_step + 1 >= self.total_steps()
    }

    pub fn progress(&self) -> u8 {
        progress_percent(self.current_step, self.total_steps())
    }

    pub fn visibility(&self) -> VisibilityMap {
        match &self.definition {
            Some(definition) => resolve_visibility(&definition.fields, &self.values),
            None => VisibilityMap::new(),
        }
    }

    /// Active and visible fields of the whole form.
    pub fn visible_fields(&self) -> Vec<&FieldDefinition> {
        match &self.definition {
            Some(definition) => visible_fields(definition.active_fields(), &self.values),
            None => Vec::new(),
        }
    }

    pub fn required_fields(&self) -> BTreeSet<String> {
        match &self.definition {
            Some(definition) => required_names(&definition.fields, &self.values),
            None => BTreeSet::new(),
        }
    }

    /// Visible fields of the current step.
    pub fn step_fields(&self) -> Vec<&FieldDefinition> {
        match &self.definition {
            Some(definition) => visible_step_fields(definition, self.current_step, &self.values),
            None => Vec::new(),
        }
    }

    pub fn step_name(&self) -> Option<String> {
        let definition = self.definition.as_deref()?;
        step_at(definition, self.current_step).map(|step| step.name.clone())
    }

    /// Validates the visible fields of the current step and advances.
    /// On the last step this only validates.
    pub fn next_step(&mut self) -> Result<usize, SessionError> {
        let definition = Arc::clone(self.ensure_editable()?);
        let names: BTreeSet<String> =
            visible_step_fields(&definition, self.current_step, &self.values)
                .iter()
                .map(|field| field.name.clone())
                .collect();
        let outcome = match &self.validator {
            Some(validator) => validator.validate_only(&self.values, &names),
            None => return Err(SessionError::NotReady),
        };

        for name in &names {
            self.errors.remove(name);
        }
        if !outcome.valid {
            tracing::debug!(
                step = self.current_step,
                errors = outcome.errors.len(),
                "step blocked by validation"
            );
            self.errors.extend(outcome.errors.clone());
            if let Some(observer) = &self.observer {
                observer.on_validation_error(&outcome.errors);
            }
            return Err(SessionError::Validation(outcome.errors));
        }

        if !self.is_last_step() {
            self.set_step(self.current_step + 1);
        }
        Ok(self.current_step)
    }

    /// Steps back without validating.
    pub fn prev_step(&mut self) -> Result<usize, SessionError> {
        self.ensure_editable()?;
        if self.current_step > 0 {
            self.set_step(self.current_step - 1);
        }
        Ok(self.current_step)
    }

    /// Jumps to `step`; out-of-range targets leave the session unchanged.
    pub fn go_to_step(&mut self, step: usize) -> Result<bool, SessionError> {
        self.ensure_editable()?;
        if step >= self.total_steps() {
            return Ok(false);
        }
        self.set_step(step);
        Ok(true)
    }

    fn set_step(&mut self, step: usize) {
        if step == self.current_step {
            return;
        }
        self.current_step = step;
        let total = self.total_steps();
        tracing::debug!(form = %self.form_id, step, total, "step changed");
        if let Some(observer) = &self.observer {
            observer.on_step_change(step, total);
        }
    }

    /// Back to the first step with default values.
    pub fn reset(&mut self) -> Result<(), SessionError> {
        let definition = Arc::clone(self.ensure_editable()?);
        if self.status == SessionStatus::Submitting {
            return Err(SessionError::SubmitInFlight);
        }
        self.values = initial_values(&definition);
        self.errors.clear();
        self.last_error = None;
        self.set_step(0);
        Ok(())
    }

    /// Validates the whole snapshot and moves to `submitting`. The returned
    /// request carries the values as they are at this moment.
    pub fn begin_submit(
        &mut self,
        context: &SubmitContext,
    ) -> Result<SubmitFormRequest, SessionError> {
        match self.status {
            SessionStatus::Ready => {}
            SessionStatus::Submitting => return Err(SessionError::SubmitInFlight),
            SessionStatus::Success => return Err(SessionError::AlreadySubmitted),
            SessionStatus::Loading | SessionStatus::Error => return Err(SessionError::NotReady),
        }
        let (Some(definition), Some(validator)) = (&self.definition, &self.validator) else {
            return Err(SessionError::NotReady);
        };

        let outcome = validator.validate(&self.values);
        let mut errors = outcome.errors;
        let settings = &definition.settings;
        let consented = self.values.get(CONSENT_KEY) == Some(&Value::Bool(true));
        if settings.show_consent_checkbox && !consented {
            errors.insert(
                CONSENT_KEY.to_string(),
                self.messages.plain(MessageKey::ConsentRequired),
            );
        }
        let recaptcha_token = context
            .recaptcha_token
            .clone()
            .or_else(|| {
                self.values
                    .get(RECAPTCHA_TOKEN_KEY)
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .filter(|token| !token.trim().is_empty());
        if settings.enable_recaptcha && recaptcha_token.is_none() {
            errors.insert(
                RECAPTCHA_TOKEN_KEY.to_string(),
                self.messages.plain(MessageKey::CaptchaRequired),
            );
        }

        if !errors.is_empty() {
            tracing::debug!(
                form = %self.form_id,
                errors = errors.len(),
                "submission blocked by validation"
            );
            self.errors = errors.clone();
            if let Some(observer) = &self.observer {
                observer.on_validation_error(&errors);
            }
            return Err(SessionError::Validation(errors));
        }

        self.errors.clear();
        self.last_error = None;
        self.status = SessionStatus::Submitting;
        tracing::info!(form = %self.form_id, fields = outcome.data.len(), "submitting form");
        Ok(SubmitFormRequest {
            data: outcome.data,
            utm_parameters: context.utm_parameters.clone(),
            referrer: context.referrer.clone(),
            recaptcha_token,
            honeypot: context.honeypot.clone(),
        })
    }

    /// Applies the transport result of a submission started with
    /// [`FormSession::begin_submit`]. Failures return the session to `ready`.
    pub fn finish_submit(
        &mut self,
        result: Result<SubmitFormResponse, TransportError>,
    ) -> Result<SubmitFormResponse, SessionError> {
        if self.status != SessionStatus::Submitting {
            return Err(SessionError::NotReady);
        }
        match result {
            Ok(response) => {
                tracing::info!(
                    form = %self.form_id,
                    submission = %response.submission_id,
                    "form submitted"
                );
                self.status = SessionStatus::Success;
                self.response = Some(response.clone());
                if let Some(observer) = &self.observer {
                    observer.on_success(&response);
                }
                Ok(response)
            }
            Err(err) => {
                tracing::warn!(form = %self.form_id, error = %err, "form submission failed");
                self.status = SessionStatus::Ready;
                self.last_error = Some(err.to_api_error().error);
                if let Some(observer) = &self.observer {
                    observer.on_error(&err);
                }
                Err(SessionError::Transport(err))
            }
        }
    }

    pub async fn submit(
        &mut self,
        transport: &dyn FormTransport,
        context: &SubmitContext,
    ) -> Result<SubmitFormResponse, SessionError> {
        let request = self.begin_submit(context)?;
        let result = transport.submit_form(&self.form_id, &request).await;
        self.finish_submit(result)
    }

    /// Render payload for the current step; `None` until a definition is loaded.
    pub fn render_payload(
        &self,
        registry: &RendererRegistry,
        regions: &dyn RegionDirectory,
    ) -> Option<RenderPayload> {
        let definition = self.definition.as_deref()?;
        let status = match self.status {
            SessionStatus::Submitting => RenderStatus::Submitting,
            SessionStatus::Success => RenderStatus::Success,
            _ => RenderStatus::Ready,
        };
        Some(build_render_payload(
            &RenderInput {
                form: definition,
                values: &self.values,
                current_step: self.current_step,
                errors: &self.errors,
                status,
            },
            registry,
            regions,
        ))
    }
}

impl std::fmt::Debug for FormSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormSession")
            .field("form_id", &self.form_id)
            .field("status", &self.status)
            .field("current_step", &self.current_step)
            .field("values", &self.values)
            .field("errors", &self.errors)
            .finish()
    }
}

fn initial_values(definition: &FormDefinition) -> ValueSnapshot {
    definition
        .active_fields()
        .into_iter()
        .filter(|field| !field.kind.is_display_only())
        .filter_map(|field| field.initial_value().map(|value| (field.name.clone(), value)))
        .collect()
}
