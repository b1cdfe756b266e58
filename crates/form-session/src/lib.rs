//! Session controller and HTTP boundary for server-defined forms.
//!
//! A [`FormSession`] owns one form's value snapshot, current step and
//! submission state. Definitions are fetched and submissions delivered
//! through a [`FormTransport`]; [`FormsClient`] implements it over HTTP.

pub mod registry;
pub mod session;
pub mod transport;

pub use registry::{SessionHandle, SessionRegistry};
pub use session::{
    CONSENT_KEY, FormSession, RECAPTCHA_TOKEN_KEY, SessionError, SessionObserver, SessionStatus,
    SubmitContext,
};
pub use transport::{
    ApiError, ClientConfig, ConfirmResponse, DEFAULT_TIMEOUT, FormTransport, FormsClient,
    SubmitFormRequest, SubmitFormResponse, TransportError, UtmParameters,
};
