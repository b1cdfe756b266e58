use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use form_spec::FormDefinition;
use reqwest::{StatusCode, header};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use url::Url;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const FALLBACK_ERROR: &str = "An error occurred";

/// Error object returned by the forms API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// HTTP status of the failed response; not part of the wire format.
    #[serde(skip)]
    pub status: Option<u16>,
}

impl ApiError {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: None,
            details: None,
            status: None,
        }
    }

    /// Translates a non-2xx response body. Bodies that are not JSON become
    /// `HTTP {status}: {reason}`.
    pub fn from_response(status: StatusCode, body: &[u8]) -> Self {
        match serde_json::from_slice::<Value>(body) {
            Ok(data) => {
                let text = |key: &str| {
                    data.get(key)
                        .and_then(Value::as_str)
                        .filter(|text| !text.is_empty())
                        .map(str::to_string)
                };
                Self {
                    error: text("error")
                        .or_else(|| text("message"))
                        .unwrap_or_else(|| FALLBACK_ERROR.to_string()),
                    code: text("code"),
                    details: data.get("details").filter(|details| !details.is_null()).cloned(),
                    status: Some(status.as_u16()),
                }
            }
            Err(_) => Self {
                error: format!(
                    "HTTP {}: {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or_default()
                ),
                code: None,
                details: None,
                status: Some(status.as_u16()),
            },
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} ({})", self.error, code),
            None => f.write_str(&self.error),
        }
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("{0}")]
    Api(ApiError),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl TransportError {
    /// Collapses any failure into the API error shape shown to users.
    pub fn to_api_error(&self) -> ApiError {
        match self {
            TransportError::Api(error) => error.clone(),
            other => ApiError::new(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtmParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medium: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub term: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl UtmParameters {
    /// Reads `utm_*` query parameters; `None` when the URL carries none.
    pub fn from_url(url: &Url) -> Option<Self> {
        let mut utm = Self::default();
        for (key, value) in url.query_pairs() {
            if value.is_empty() {
                continue;
            }
            let slot = match key.as_ref() {
                "utm_source" => &mut utm.source,
                "utm_medium" => &mut utm.medium,
                "utm_campaign" => &mut utm.campaign,
                "utm_term" => &mut utm.term,
                "utm_content" => &mut utm.content,
                _ => continue,
            };
            *slot = Some(value.into_owned());
        }
        (!utm.is_empty()).then_some(utm)
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_none()
            && self.medium.is_none()
            && self.campaign.is_none()
            && self.term.is_none()
            && self.content.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmitFormRequest {
    pub data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_parameters: Option<UtmParameters>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recaptcha_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub honeypot: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitFormResponse {
    pub success: bool,
    #[serde(default)]
    pub submission_id: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub requires_confirmation: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub submission_id: String,
}

/// Fetch/submit boundary of a form session.
#[async_trait]
pub trait FormTransport: Send + Sync {
    async fn fetch_form(&self, form_id: &str) -> Result<FormDefinition, TransportError>;

    async fn submit_form(
        &self,
        form_id: &str,
        request: &SubmitFormRequest,
    ) -> Result<SubmitFormResponse, TransportError>;

    async fn confirm_opt_in(&self, token: &str) -> Result<ConfirmResponse, TransportError>;
}

/// Configuration for [`FormsClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: format!("dynform/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// HTTP client for the public forms API.
#[derive(Clone)]
pub struct FormsClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    base_url: Url,
    http: reqwest::Client,
}

impl FormsClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, TransportError> {
        Self::with_config(ClientConfig {
            base_url: base_url.into(),
            ..ClientConfig::default()
        })
    }

    pub fn with_config(config: ClientConfig) -> Result<Self, TransportError> {
        let base_url = Url::parse(config.base_url.trim_end_matches('/'))?;
        if base_url.cannot_be_a_base() {
            return Err(TransportError::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase));
        }

        let mut headers = header::HeaderMap::new();
        headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(config.user_agent)
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            inner: Arc::new(ClientInner { base_url, http }),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, TransportError> {
        let mut url = self.inner.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| TransportError::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn request<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: reqwest::Method,
        url: Url,
        body: Option<&B>,
    ) -> Result<T, TransportError> {
        tracing::debug!(%method, %url, "forms api request");
        let mut request = self.inner.http.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        if status.is_success() {
            return Ok(serde_json::from_slice(&body)?);
        }

        let error = ApiError::from_response(status, &body);
        tracing::warn!(status = status.as_u16(), error = %error, "forms api returned an error");
        Err(TransportError::Api(error))
    }
}

impl fmt::Debug for FormsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormsClient")
            .field("base_url", &self.inner.base_url.as_str())
            .finish()
    }
}

#[async_trait]
impl FormTransport for FormsClient {
    async fn fetch_form(&self, form_id: &str) -> Result<FormDefinition, TransportError> {
        let url = self.endpoint(&["public", "forms", form_id])?;
        self.request(reqwest::Method::GET, url, None::<&()>).await
    }

    async fn submit_form(
        &self,
        form_id: &str,
        request: &SubmitFormRequest,
    ) -> Result<SubmitFormResponse, TransportError> {
        let url = self.endpoint(&["public", "forms", form_id, "submit"])?;
        self.request(reqwest::Method::POST, url, Some(request)).await
    }

    async fn confirm_opt_in(&self, token: &str) -> Result<ConfirmResponse, TransportError> {
        let url = self.endpoint(&["public", "forms", "confirm", token])?;
        self.request(reqwest::Method::GET, url, None::<&()>).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_body_prefers_error_then_message() {
        let error = ApiError::from_response(
            StatusCode::BAD_REQUEST,
            br#"{"error":"Form is closed","code":"closed"}"#,
        );
        assert_eq!(error.error, "Form is closed");
        assert_eq!(error.code.as_deref(), Some("closed"));
        assert_eq!(error.status, Some(400));

        let error = ApiError::from_response(StatusCode::NOT_FOUND, br#"{"message":"Missing"}"#);
        assert_eq!(error.error, "Missing");

        let error = ApiError::from_response(StatusCode::CONFLICT, br#"{"error":""}"#);
        assert_eq!(error.error, "An error occurred");
    }

    #[test]
    fn non_json_error_body_uses_status_line() {
        let error = ApiError::from_response(StatusCode::BAD_GATEWAY, b"<html>upstream</html>");
        assert_eq!(error.error, "HTTP 502: Bad Gateway");
    }

    #[test]
    fn utm_parameters_come_from_query() {
        let page = "https://example.com/?utm_source=news&utm_campaign=fall&utm_term=&ref=x";
        let url = Url::parse(page).expect("url");
        let utm = UtmParameters::from_url(&url).expect("utm");
        assert_eq!(utm.source.as_deref(), Some("news"));
        assert_eq!(utm.campaign.as_deref(), Some("fall"));
        assert!(utm.term.is_none());

        let plain = Url::parse("https://example.com/landing").expect("url");
        assert!(UtmParameters::from_url(&plain).is_none());
    }

    #[test]
    fn endpoints_strip_trailing_slash_and_encode_ids() {
        let client = FormsClient::new("https://api.example.com/v1/").expect("client");
        let url = client.endpoint(&["public", "forms", "a b"]).expect("url");
        assert_eq!(url.as_str(), "https://api.example.com/v1/public/forms/a%20b");

        let root = FormsClient::new("https://api.example.com").expect("client");
        let url = root.endpoint(&["public", "forms", "confirm", "tok"]).expect("url");
        assert_eq!(url.as_str(), "https://api.example.com/public/forms/confirm/tok");
    }

    #[test]
    fn submit_request_omits_empty_context() {
        let request = SubmitFormRequest {
            data: serde_json::json!({ "email": "a@b.com" }).as_object().cloned().expect("map"),
            ..SubmitFormRequest::default()
        };
        assert_eq!(
            serde_json::to_value(&request).expect("encode"),
            serde_json::json!({ "data": { "email": "a@b.com" } })
        );
    }
}
