use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use form_session::{
    FormSession, FormTransport, FormsClient, SessionError, SessionStatus, SubmitContext,
    TransportError,
};

const MULTI_STEP: &str = include_str!("../../form-spec/tests/fixtures/multi_step.json");

async fn server_with_form() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/public/forms/onboarding"))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(MULTI_STEP, "application/json"))
        .mount(&server)
        .await;
    server
}

fn client(server: &MockServer) -> FormsClient {
    FormsClient::new(format!("{}/api/", server.uri())).expect("client")
}

#[tokio::test]
async fn fetch_form_decodes_definition() {
    let server = server_with_form().await;
    let form = client(&server).fetch_form("onboarding").await.expect("form");
    assert_eq!(form.id, "onboarding");
    assert_eq!(form.total_steps(), 2);
}

#[tokio::test]
async fn api_errors_are_translated() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/public/forms/closed"))
        .respond_with(ResponseTemplate::new(410).set_body_json(json!({
            "message": "This form is no longer accepting responses",
            "code": "form_closed"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/public/forms/broken"))
        .respond_with(ResponseTemplate::new(500).set_body_string("oops"))
        .mount(&server)
        .await;

    let client = client(&server);
    let Err(TransportError::Api(error)) = client.fetch_form("closed").await else {
        panic!("expected api error");
    };
    assert_eq!(error.error, "This form is no longer accepting responses");
    assert_eq!(error.code.as_deref(), Some("form_closed"));
    assert_eq!(error.status, Some(410));

    let Err(TransportError::Api(error)) = client.fetch_form("broken").await else {
        panic!("expected api error");
    };
    assert_eq!(error.error, "HTTP 500: Internal Server Error");
}

#[tokio::test]
async fn session_walks_steps_and_submits_normalized_data() {
    let server = server_with_form().await;
    Mock::given(method("POST"))
        .and(path("/api/public/forms/onboarding/submit"))
        .and(body_json(json!({
            "data": { "email": "a@b.com", "company": "Acme", "team_size": 12 },
            "referrer": "https://example.com/join?utm_source=mail",
            "utm_parameters": { "source": "mail" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "submission_id": "sub-42",
            "message": "Welcome aboard",
            "requires_confirmation": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    let mut session = FormSession::new("onboarding");
    session.load(&client).await.expect("load");
    assert_eq!(session.status(), SessionStatus::Ready);

    session.set_value("email", json!("")).expect("set");
    assert!(matches!(session.next_step(), Err(SessionError::Validation(_))));
    assert_eq!(session.current_step(), 0);

    session.set_value("email", json!("a@b.com")).expect("set");
    assert_eq!(session.next_step().expect("advance"), 1);

    session.set_value("company", json!("Acme")).expect("set");
    assert!(session.required_fields().contains("team_size"));
    session.set_value("team_size", json!("12")).expect("set");

    let context =
        SubmitContext::from_page_url("https://example.com/join?utm_source=mail").expect("context");
    let response = session.submit(&client, &context).await.expect("submit");
    assert_eq!(response.submission_id, "sub-42");
    assert!(response.requires_confirmation);
    assert_eq!(session.status(), SessionStatus::Success);
}

#[tokio::test]
async fn failed_fetch_is_terminal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/public/forms/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": "Form not found"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    let mut session = FormSession::new("missing");
    assert!(matches!(session.load(&client).await, Err(SessionError::Transport(_))));
    assert_eq!(session.status(), SessionStatus::Error);
    assert_eq!(session.error(), Some("Form not found"));
    assert!(matches!(session.load(&client).await, Err(SessionError::NotReady)));
}

#[tokio::test]
async fn submit_failure_allows_retry() {
    let server = server_with_form().await;
    Mock::given(method("POST"))
        .and(path("/api/public/forms/onboarding/submit"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({ "error": "Slow down" })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/public/forms/onboarding/submit"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "success": true, "submission_id": "sub-2", "message": "ok"
        })))
        .mount(&server)
        .await;

    let client = client(&server);
    let mut session = FormSession::new("onboarding");
    session.load(&client).await.expect("load");
    session.set_value("email", json!("a@b.com")).expect("set");

    let context = SubmitContext::default();
    assert!(matches!(
        session.submit(&client, &context).await,
        Err(SessionError::Transport(TransportError::Api(_)))
    ));
    assert_eq!(session.status(), SessionStatus::Ready);
    assert_eq!(session.error(), Some("Slow down"));

    let response = session.submit(&client, &context).await.expect("retry");
    assert_eq!(response.submission_id, "sub-2");
}

#[tokio::test]
async fn confirm_opt_in_hits_token_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/public/forms/confirm/tok-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true, "message": "Subscription confirmed", "submission_id": "sub-9"
        })))
        .mount(&server)
        .await;

    let confirmed = client(&server).confirm_opt_in("tok-123").await.expect("confirm");
    assert!(confirmed.success);
    assert_eq!(confirmed.submission_id, "sub-9");
}
