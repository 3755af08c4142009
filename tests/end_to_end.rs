//! End-to-end: a Socket Mode envelope goes in, a `chat.postMessage` comes out.
//!
//! Both devRant and the Slack Web API are served by wiremock.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use devrant_bot::bot::events::{Envelope, classify, parse_event};
use devrant_bot::bot::{Command, Dispatch, Router, SessionRegistry, SlackClient, SocketSession, Started};
use devrant_bot::devrant::Client;
use devrant_bot::report::ErrorReporter;

const BOT_USER: &str = "UBOT";

#[derive(Default)]
struct Reports(Mutex<Vec<String>>);

impl ErrorReporter for Reports {
    fn report(&self, command: &str, _error: &dyn std::error::Error) {
        self.0.lock().unwrap().push(command.to_string());
    }
}

fn rant_json(id: u64) -> Value {
    json!({
        "id": id,
        "text": "a".repeat(120),
        "score": 321,
        "created_time": 1_500_000_000,
        "attached_image": "",
        "num_comments": 4,
        "tags": [],
        "user_id": 7,
        "user_username": "bob",
        "user_score": 55
    })
}

fn envelope(event: Value) -> String {
    json!({
        "envelope_id": "env-1",
        "type": "events_api",
        "payload": { "team_id": "T1", "event": event }
    })
    .to_string()
}

struct Stack {
    devrant: MockServer,
    slack: MockServer,
    reports: Arc<Reports>,
    router: Router,
}

async fn stack() -> Stack {
    let devrant = MockServer::start().await;
    let slack = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat.postMessage"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "ts": "2.2"})))
        .mount(&slack)
        .await;

    let reports = Arc::new(Reports::default());
    let router = Router::new(
        Arc::new(Client::new(devrant.uri(), Duration::from_secs(5)).unwrap()),
        Arc::new(SlackClient::new(slack.uri(), "xoxb-test").unwrap()),
        reports.clone(),
    );

    Stack { devrant, slack, reports, router }
}

/// Run one raw envelope through parsing, classification and routing.
async fn deliver(stack: &Stack, raw: &str) -> Dispatch {
    let envelope: Envelope = serde_json::from_str(raw).unwrap();
    let inbound = envelope
        .payload
        .as_ref()
        .and_then(parse_event)
        .and_then(|event| classify(&event, BOT_USER));

    match inbound {
        Some(msg) => stack.router.handle(&msg).await,
        None => Dispatch::Ignored,
    }
}

async fn posted(slack: &MockServer) -> Vec<Value> {
    slack
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == "/chat.postMessage")
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect()
}

#[tokio::test]
async fn test_direct_message_rant_lookup() {
    let stack = stack().await;
    Mock::given(method("GET"))
        .and(path("/devrant/rants/1234567"))
        .and(query_param("app", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "rant": rant_json(1234567)
        })))
        .mount(&stack.devrant)
        .await;

    let raw = envelope(json!({
        "type": "message",
        "channel": "D42",
        "channel_type": "im",
        "user": "U1",
        "text": "rant 1234567",
        "ts": "1.1"
    }));

    assert_eq!(deliver(&stack, &raw).await, Dispatch::Replied(Command::Rant(1234567)));

    let posts = posted(&stack.slack).await;
    assert_eq!(posts.len(), 1);
    let attachment = &posts[0]["attachments"][0];
    assert_eq!(posts[0]["channel"], "D42");
    assert_eq!(attachment["color"], "#f99a66");
    assert_eq!(attachment["author_name"], "bob");
    assert_eq!(
        attachment["title_link"],
        "https://www.devrant.io/rants/1234567?ref=devrant-bot"
    );
    assert_eq!(
        attachment["author_link"],
        "https://www.devrant.io/users/bob?ref=devrant-bot"
    );
    assert_eq!(attachment["title"], format!("{}...", "a".repeat(100)));
    assert_eq!(attachment["fields"][0]["title"], "Score");
    assert_eq!(attachment["fields"][0]["value"], "321");
    assert_eq!(attachment["fields"][1]["title"], "Comments");
    assert_eq!(attachment["fields"][1]["value"], "4");
    assert!(attachment.get("image_url").is_none());
    assert!(stack.reports.0.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_mention_in_thread_searches() {
    let stack = stack().await;
    Mock::given(method("GET"))
        .and(path("/devrant/search"))
        .and(query_param("term", "golang"))
        .and(query_param("limit", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "results": [rant_json(11), rant_json(12)]
        })))
        .mount(&stack.devrant)
        .await;

    let raw = envelope(json!({
        "type": "app_mention",
        "channel": "C1",
        "user": "U1",
        "text": "<@UBOT> search golang",
        "ts": "3.3",
        "thread_ts": "3.0"
    }));

    assert_eq!(
        deliver(&stack, &raw).await,
        Dispatch::Replied(Command::Search("golang".into()))
    );

    let posts = posted(&stack.slack).await;
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0]["channel"], "C1");
    assert_eq!(posts[0]["thread_ts"], "3.0");
}

#[tokio::test]
async fn test_empty_search_says_so() {
    let stack = stack().await;
    Mock::given(method("GET"))
        .and(path("/devrant/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "results": []
        })))
        .mount(&stack.devrant)
        .await;

    let raw = envelope(json!({
        "type": "message",
        "channel": "D42",
        "channel_type": "im",
        "user": "U1",
        "text": "search golang",
        "ts": "1.1"
    }));

    assert_eq!(
        deliver(&stack, &raw).await,
        Dispatch::NoResults(Command::Search("golang".into()))
    );
    let posts = posted(&stack.slack).await;
    assert_eq!(
        posts[0]["text"],
        "I couldn't find any rants matching `golang`, sorry :cry:."
    );
    assert!(posts[0].get("attachments").is_none());
}

#[tokio::test]
async fn test_upstream_failure_apologizes() {
    let stack = stack().await;
    Mock::given(method("GET"))
        .and(path("/devrant/weekly-rants"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "success": false,
            "error": "database unavailable"
        })))
        .mount(&stack.devrant)
        .await;

    let raw = envelope(json!({
        "type": "message",
        "channel": "D42",
        "channel_type": "im",
        "user": "U1",
        "text": "weekly",
        "ts": "1.1"
    }));

    assert_eq!(deliver(&stack, &raw).await, Dispatch::Apologized(Command::Weekly));
    let posts = posted(&stack.slack).await;
    assert_eq!(posts[0]["text"], "I had trouble getting the weekly rants, sorry :cry:.");
    assert_eq!(*stack.reports.0.lock().unwrap(), ["weekly"]);
}

#[tokio::test]
async fn test_ambient_chatter_is_ignored() {
    let stack = stack().await;

    let raw = envelope(json!({
        "type": "message",
        "channel": "C1",
        "channel_type": "channel",
        "user": "U1",
        "text": "anyone seen the weekly numbers?",
        "ts": "1.1"
    }));

    assert_eq!(deliver(&stack, &raw).await, Dispatch::Ignored);
    assert!(posted(&stack.slack).await.is_empty());
    assert!(stack.devrant.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn test_help_is_sent_privately() {
    let stack = stack().await;
    Mock::given(method("POST"))
        .and(path("/conversations.open"))
        .and(body_partial_json(json!({"users": "U1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "channel": {"id": "D-PRIVATE"}
        })))
        .mount(&stack.slack)
        .await;

    let raw = envelope(json!({
        "type": "app_mention",
        "channel": "C1",
        "user": "U1",
        "text": "<@UBOT> help",
        "ts": "1.1"
    }));

    assert_eq!(deliver(&stack, &raw).await, Dispatch::Replied(Command::Help));
    let posts = posted(&stack.slack).await;
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0]["channel"], "D-PRIVATE");
    assert!(posts[0]["text"].as_str().unwrap().contains("`weekly`"));
}

// =============================================================================
// SESSION LIFECYCLE
// =============================================================================

fn session(slack: &MockServer, registry: Arc<SessionRegistry>) -> SocketSession {
    let client = Arc::new(SlackClient::new(slack.uri(), "xoxb-test").unwrap());
    let router = Arc::new(Router::new(
        Arc::new(Client::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap()),
        client.clone(),
        Arc::new(Reports::default()),
    ));
    SocketSession::new("xapp-test".to_string(), client, router, registry)
}

#[tokio::test]
async fn test_second_session_for_same_token_is_refused() {
    let slack = MockServer::start().await;
    let registry = Arc::new(SessionRegistry::new());
    assert!(registry.try_register("xapp-test"));

    let started = session(&slack, registry.clone()).run().await.unwrap();

    assert_eq!(started, Started::AlreadyRunning);
    assert_eq!(registry.len(), 1);
    assert!(slack.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn test_failed_session_leaves_registry() {
    let slack = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth.test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": false,
            "error": "invalid_auth"
        })))
        .mount(&slack)
        .await;
    let registry = Arc::new(SessionRegistry::new());

    let result = session(&slack, registry.clone()).run().await;

    assert!(result.unwrap_err().to_string().contains("invalid_auth"));
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_rejected_app_token_stops_after_greeting() {
    let slack = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth.test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true, "user_id": "UBOT", "team_id": "T1"
        })))
        .mount(&slack)
        .await;
    Mock::given(method("POST"))
        .and(path("/conversations.open"))
        .and(body_partial_json(json!({"users": "UINSTALL"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true, "channel": {"id": "D-INSTALL"}
        })))
        .mount(&slack)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat.postMessage"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&slack)
        .await;
    Mock::given(method("POST"))
        .and(path("/apps.connections.open"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": false, "error": "not_allowed_token_type"
        })))
        .expect(1)
        .mount(&slack)
        .await;
    let registry = Arc::new(SessionRegistry::new());

    let session = session(&slack, registry.clone()).with_installer(Some("UINSTALL".to_string()));
    let result = tokio::time::timeout(Duration::from_secs(3), session.run())
        .await
        .expect("session gives up instead of retrying");

    assert!(result.unwrap_err().to_string().contains("not_allowed_token_type"));
    assert!(registry.is_empty());

    let posts = posted(&slack).await;
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0]["channel"], "D-INSTALL");
    assert!(posts[0]["text"].as_str().unwrap().contains("devRant bot"));
}
