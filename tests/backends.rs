use std::sync::Arc;

use ego::{
    domain::communication::{
        backend::{Backend, BackendError},
        email::{Address, Email, TemplateContext},
    },
    infrastructure::{
        email::{
            MandrillBackend, MandrillConfig, PostageAppBackend, PostageAppConfig, SendGridBackend,
            SendGridConfig,
        },
        http::{HttpClientConfig, ReqwestTransport},
    },
};
use testresult::TestResult;
use wiremock::{
    matchers::{body_partial_json, body_string_contains, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

const REJECTION: &str = r#"{"status":"error","message":"boom"}"#;

fn email() -> Email {
    let mut email = Email::new(Address::new("Nyasia Block", "jade@austen.name"));

    email.add_recipient(
        "Sandy Schulist",
        "zane@anastacio.co.uk",
        TemplateContext::from([("name".to_string(), "Sandy".to_string())]),
    );
    email.subject = "Integration".to_string();
    email.text_body = "Hello".to_string();
    email.html_body = "<p>Hello</p>".to_string();
    email.add_attachment("notes.txt", "text/plain", &b"some notes"[..]);

    email
}

fn transport() -> Arc<ReqwestTransport> {
    Arc::new(ReqwestTransport::new(&HttpClientConfig::default()).expect("http client"))
}

fn mandrill(server: &MockServer) -> MandrillBackend<ReqwestTransport> {
    let mut config = MandrillConfig::new("mandrill-key");
    config.api_url = server.uri();

    MandrillBackend::new(config, transport())
}

fn sendgrid(server: &MockServer) -> SendGridBackend<ReqwestTransport> {
    let mut config = SendGridConfig::new("sendgrid-user", "sendgrid-pass");
    config.api_url = server.uri();

    SendGridBackend::new(config, transport())
}

fn postageapp(server: &MockServer) -> PostageAppBackend<ReqwestTransport> {
    let mut config = PostageAppConfig::new("postageapp-key");
    config.api_url = server.uri();

    PostageAppBackend::new(config, transport())
}

async fn reject_everything(server: &MockServer, status: u16, body: &str) {
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .expect(1)
        .mount(server)
        .await;
}

async fn assert_rejected(backend: &dyn Backend) {
    let result = backend.send(&mut email()).await;

    match result {
        Err(BackendError::Rejected(err)) => {
            let message = err.to_string();

            assert!(message.contains("error"), "{message}");
            assert!(message.contains("boom"), "{message}");
            assert_eq!(err.http_status, 500);
            assert_eq!(err.provider, backend.name());
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

async fn assert_undecodable(backend: &dyn Backend) {
    let err = backend
        .send(&mut email())
        .await
        .expect_err("a 500 must fail the send");

    assert!(matches!(
        err,
        BackendError::UndecodableErrorBody { status: 500, .. }
    ));
    assert!(err.to_string().contains("500"));
}

#[tokio::test]
async fn test_mandrill_send() -> TestResult {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/messages/send.json"))
        .and(header("content-type", "application/json"))
        .and(body_partial_json(serde_json::json!({
            "key": "mandrill-key",
            "message": {
                "subject": "Integration",
                "to": [{"email": "zane@anastacio.co.uk", "name": "Sandy Schulist", "type": "to"}],
                "attachments": [{"type": "text/plain", "name": "notes.txt", "content": "c29tZSBub3Rlcw=="}],
            },
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"[{"status":"sent"}]"#))
        .expect(1)
        .mount(&server)
        .await;

    mandrill(&server).send(&mut email()).await?;

    Ok(())
}

#[tokio::test]
async fn test_mandrill_template_send() -> TestResult {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/messages/send-template.json"))
        .and(body_partial_json(serde_json::json!({
            "template_name": "welcome",
            "message": {
                "global_merge_vars": [{"name": "plan", "content": "pro"}],
            },
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
        .expect(1)
        .mount(&server)
        .await;

    let mut email = email();
    email.template_id = Some("welcome".to_string());
    email.template_context = TemplateContext::from([("plan".to_string(), "pro".to_string())]);

    mandrill(&server).send(&mut email).await?;

    Ok(())
}

#[tokio::test]
async fn test_mandrill_rejected() {
    let server = MockServer::start().await;
    reject_everything(&server, 500, REJECTION).await;

    assert_rejected(&mandrill(&server)).await;
}

#[tokio::test]
async fn test_mandrill_undecodable() {
    let server = MockServer::start().await;
    reject_everything(&server, 500, "<html>oops</html>").await;

    assert_undecodable(&mandrill(&server)).await;
}

#[tokio::test]
async fn test_sendgrid_send() -> TestResult {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/mail.send.json"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string_contains("api_user=sendgrid-user"))
        .and(body_string_contains("api_key=sendgrid-pass"))
        .and(body_string_contains("to%5B%5D=zane%40anastacio.co.uk"))
        .and(body_string_contains("files%5Bnotes.txt%5D=some+notes"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"message":"success"}"#))
        .expect(1)
        .mount(&server)
        .await;

    sendgrid(&server).send(&mut email()).await?;

    Ok(())
}

#[tokio::test]
async fn test_sendgrid_rejects_bad_template_context_before_posting() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut email = email();
    email.template_id = Some("welcome".to_string());

    let result = sendgrid(&server).send(&mut email).await;

    assert!(matches!(result, Err(BackendError::Translation(_))));
}

#[tokio::test]
async fn test_sendgrid_rejected() {
    let server = MockServer::start().await;
    reject_everything(&server, 500, REJECTION).await;

    assert_rejected(&sendgrid(&server)).await;
}

#[tokio::test]
async fn test_sendgrid_undecodable() {
    let server = MockServer::start().await;
    reject_everything(&server, 500, "Internal Server Error").await;

    assert_undecodable(&sendgrid(&server)).await;
}

#[tokio::test]
async fn test_postageapp_send() -> TestResult {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v.1.0/send_message.json"))
        .and(header("content-type", "application/json"))
        .and(body_partial_json(serde_json::json!({
            "api_key": "postageapp-key",
            "arguments": {
                "recipients": {"\"Sandy Schulist\" <zane@anastacio.co.uk>": {"name": "Sandy"}},
                "headers": {"subject": "Integration"},
                "content": {"text/plain": "Hello", "text/html": "<p>Hello</p>"},
                "attachments": {"notes.txt": {"content_type": "text/plain", "content": "c29tZSBub3Rlcw=="}},
            },
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(r#"{"response":{"status":"ok"}}"#),
        )
        .expect(1)
        .mount(&server)
        .await;

    postageapp(&server).send(&mut email()).await?;

    Ok(())
}

#[tokio::test]
async fn test_postageapp_rejected() {
    let server = MockServer::start().await;
    reject_everything(&server, 500, REJECTION).await;

    assert_rejected(&postageapp(&server)).await;
}

#[tokio::test]
async fn test_postageapp_undecodable() {
    let server = MockServer::start().await;
    reject_everything(&server, 500, "").await;

    assert_undecodable(&postageapp(&server)).await;
}

#[tokio::test]
async fn test_transport_failure() {
    let mut config = MandrillConfig::new("mandrill-key");
    config.api_url = "http://127.0.0.1:1".to_string();

    let result = MandrillBackend::new(config, transport())
        .send(&mut email())
        .await;

    assert!(matches!(
        result,
        Err(BackendError::Transport {
            provider: "mandrill",
            ..
        })
    ));
}
