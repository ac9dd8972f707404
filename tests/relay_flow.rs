mod common;

use common::{MockSession, direct_message, handler, no_delay};
use hookrelay::config::{RelayConfig, WebhookConfig};
use hookrelay::relay::{FilterReason, RelayHandler, RelayOutcome, ReplyDelay};
use hookrelay::session::{InboundMessage, SessionClient};
use hookrelay::webhook::WebhookClient;
use std::sync::Arc;
use std::time::{Duration, Instant};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn webhook_replying(body: serde_json::Value) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_reply_sent_after_delay_window() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(body_json(serde_json::json!({
            "from": "15551234567@s.whatsapp.net",
            "message": "hello"
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"text": "hi there"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let session = Arc::new(MockSession::default());
    let delay = ReplyDelay::from(&RelayConfig::default());
    let handler = handler(&session, &format!("{}/hook", server.uri()), delay);

    let started = Instant::now();
    let outcome = handler
        .handle_message(direct_message("15551234567@s.whatsapp.net", "hello"))
        .await;
    let elapsed = started.elapsed();

    assert_eq!(outcome, RelayOutcome::Replied);
    assert!(elapsed >= Duration::from_millis(2000), "replied after {:?}", elapsed);
    // Upper bound of the window plus room for the local webhook round trip.
    assert!(elapsed <= Duration::from_millis(6500), "replied after {:?}", elapsed);
    let sent = session.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient, "15551234567@s.whatsapp.net");
    assert_eq!(sent[0].text, "hi there");
}

#[tokio::test]
async fn test_group_message_never_reaches_webhook() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"reply": "x"})))
        .expect(0)
        .mount(&server)
        .await;

    let session = Arc::new(MockSession::default());
    let handler = handler(&session, &format!("{}/hook", server.uri()), no_delay());

    let outcome = handler
        .handle_message(direct_message("120363025246125486@g.us", "hello all"))
        .await;

    assert_eq!(outcome, RelayOutcome::Filtered(FilterReason::Group));
    assert!(session.sent().is_empty());
}

#[tokio::test]
async fn test_filtered_messages_make_no_calls() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"reply": "x"})))
        .expect(0)
        .mount(&server)
        .await;

    let session = Arc::new(MockSession::default());
    let handler = handler(&session, &format!("{}/hook", server.uri()), no_delay());

    let own = InboundMessage {
        from_me: true,
        ..direct_message("15551234567@s.whatsapp.net", "note to self")
    };
    let stub = InboundMessage {
        has_content: false,
        ..direct_message("15551234567@s.whatsapp.net", "")
    };
    let image_only = InboundMessage {
        conversation: None,
        ..direct_message("15551234567@s.whatsapp.net", "")
    };

    assert_eq!(
        handler.handle_message(own).await,
        RelayOutcome::Filtered(FilterReason::FromSelf)
    );
    assert_eq!(
        handler.handle_message(stub).await,
        RelayOutcome::Filtered(FilterReason::NoContent)
    );
    assert_eq!(
        handler.handle_message(image_only).await,
        RelayOutcome::Filtered(FilterReason::EmptyText)
    );
    assert!(session.sent().is_empty());
}

#[tokio::test]
async fn test_webhook_timeout_sends_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"reply": "too late"}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let session = Arc::new(MockSession::default());
    let webhook = WebhookClient::new(&WebhookConfig {
        url: format!("{}/hook", server.uri()),
        timeout_secs: 1,
        ..WebhookConfig::default()
    })
    .unwrap();
    let dyn_session: Arc<dyn SessionClient> = session.clone();
    let handler = RelayHandler::new(dyn_session, Arc::new(webhook), no_delay());

    let outcome = handler
        .handle_message(direct_message("15551234567@s.whatsapp.net", "hello"))
        .await;

    assert_eq!(outcome, RelayOutcome::Failed);
    assert!(session.sent().is_empty());
}

#[tokio::test]
async fn test_unrecognized_reply_sends_nothing() {
    let server = webhook_replying(serde_json::json!({"foo": "bar"})).await;
    let session = Arc::new(MockSession::default());
    let handler = handler(&session, &format!("{}/hook", server.uri()), no_delay());

    let outcome = handler
        .handle_message(direct_message("15551234567@s.whatsapp.net", "hello"))
        .await;

    assert_eq!(outcome, RelayOutcome::NoReply);
    assert!(session.sent().is_empty());
}

#[tokio::test]
async fn test_upstream_error_sends_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("workflow crashed"))
        .expect(1)
        .mount(&server)
        .await;

    let session = Arc::new(MockSession::default());
    let handler = handler(&session, &format!("{}/hook", server.uri()), no_delay());

    let outcome = handler
        .handle_message(direct_message("15551234567@s.whatsapp.net", "hello"))
        .await;

    assert_eq!(outcome, RelayOutcome::Failed);
    assert!(session.sent().is_empty());
}

#[tokio::test]
async fn test_unreachable_webhook_sends_nothing() {
    let session = Arc::new(MockSession::default());
    let handler = handler(&session, "http://127.0.0.1:1/hook", no_delay());

    let outcome = handler
        .handle_message(direct_message("15551234567@s.whatsapp.net", "hello"))
        .await;

    assert_eq!(outcome, RelayOutcome::Failed);
    assert!(session.sent().is_empty());
}

#[tokio::test]
async fn test_reply_precedence_end_to_end() {
    let server = webhook_replying(serde_json::json!({
        "output": "third",
        "text": "second",
        "reply": "first"
    }))
    .await;
    let session = Arc::new(MockSession::default());
    let handler = handler(&session, &format!("{}/hook", server.uri()), no_delay());

    handler
        .handle_message(direct_message("15551234567@s.whatsapp.net", "hello"))
        .await;

    assert_eq!(session.sent()[0].text, "first");
}

#[tokio::test]
async fn test_failed_send_reports_failure() {
    let server = webhook_replying(serde_json::json!({"reply": "hi"})).await;
    let session = Arc::new(MockSession {
        fail_sends: true,
        ..MockSession::default()
    });
    let handler = handler(&session, &format!("{}/hook", server.uri()), no_delay());

    let outcome = handler
        .handle_message(direct_message("15551234567@s.whatsapp.net", "hello"))
        .await;

    assert_eq!(outcome, RelayOutcome::Failed);
}

#[tokio::test]
async fn test_dispatch_handles_only_first_message_of_batch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"reply": "ok"})))
        .expect(1)
        .mount(&server)
        .await;

    let session = Arc::new(MockSession::default());
    let handler = handler(&session, &format!("{}/hook", server.uri()), no_delay());

    let batch = vec![
        direct_message("111@s.whatsapp.net", "first"),
        direct_message("222@s.whatsapp.net", "second"),
    ];
    let outcome = handler.dispatch(batch).unwrap().await.unwrap();

    assert_eq!(outcome, RelayOutcome::Replied);
    let sent = session.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient, "111@s.whatsapp.net");
    assert!(handler.dispatch(Vec::new()).is_none());
}
