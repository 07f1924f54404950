//! End-to-end tests for the bot against a mock provider.
//!
//! Every endpoint (credential check, rules, stream, replies) is served by one
//! wiremock server, so these exercise the real HTTP clients.

use std::time::Duration;

use lifeline::config::{OAuthCredentials, StreamConfig};
use lifeline::{Bot, BotConfig, BotError, Credentials};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_json, body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const RULES_PATH: &str = "/2/tweets/search/stream/rules";
const STREAM_PATH: &str = "/2/tweets/search/stream";
const REPLY_PATH: &str = "/1.1/statuses/update.json";
const VERIFY_PATH: &str = "/1.1/account/verify_credentials.json";

fn credentials() -> Credentials {
    Credentials {
        bearer_token: "bearer".to_string(),
        oauth: OAuthCredentials {
            consumer_key: "key".to_string(),
            consumer_secret: "secret".to_string(),
            access_token: "token".to_string(),
            access_token_secret: "token-secret".to_string(),
        },
    }
}

fn config(server: &MockServer) -> BotConfig {
    BotConfig {
        api_base: format!("{}/2", server.uri()),
        reply_api_base: format!("{}/1.1", server.uri()),
        support_message: "Help is available.".to_string(),
        stream: StreamConfig {
            rate_limit_cooldown: Duration::from_millis(20),
            reconnect_delay: Duration::from_millis(10),
            max_backoff: Duration::from_millis(100),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn post(id: &str, text: &str, author: &str) -> String {
    serde_json::json!({
        "data": {"id": id, "text": text},
        "includes": {"users": [{"username": author}]}
    })
    .to_string()
}

async fn mount_verify(server: &MockServer, status: u16) {
    Mock::given(method("GET"))
        .and(path(VERIFY_PATH))
        .respond_with(
            ResponseTemplate::new(status)
                .set_body_json(serde_json::json!({"screen_name": "lifeline_bot"})),
        )
        .mount(server)
        .await;
}

async fn mount_rules(server: &MockServer, expected_fetches: u64) {
    Mock::given(method("GET"))
        .and(path(RULES_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [{"id": "100", "value": "old rule", "tag": "old"}]
        })))
        .expect(expected_fetches)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path(RULES_PATH))
        .and(body_json(serde_json::json!({"delete": {"ids": ["100"]}})))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(expected_fetches)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path(RULES_PATH))
        .and(body_string_contains("\"add\""))
        .respond_with(ResponseTemplate::new(201).set_body_string("{}"))
        .expect(expected_fetches)
        .mount(server)
        .await;
}

async fn reply_requests(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.url.path() == REPLY_PATH)
        .map(|r| String::from_utf8_lossy(&r.body).into_owned())
        .collect()
}

#[tokio::test]
async fn replies_once_and_reconnects_without_resyncing() {
    let server = MockServer::start().await;
    mount_verify(&server, 200).await;
    mount_rules(&server, 1).await;

    let body = format!(
        "{}\r\n\r\n{}\r\n",
        post("1", "i want to kill myself", "alice"),
        post("2", "what a nice day", "bob"),
    );
    Mock::given(method("GET"))
        .and(path(STREAM_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    // Reconnects get an empty stream that ends immediately.
    Mock::given(method("GET"))
        .and(path(STREAM_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("\r\n"))
        .with_priority(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(REPLY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .mount(&server)
        .await;

    let bot = Bot::new(config(&server), credentials()).unwrap();
    let cancel = CancellationToken::new();
    let run = tokio::spawn(bot.run(cancel.clone()));

    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let reconnects = server
                .received_requests()
                .await
                .unwrap_or_default()
                .iter()
                .filter(|r| r.url.path() == STREAM_PATH)
                .count();
            if reconnects >= 3 && !reply_requests(&server).await.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    cancel.cancel();
    let summary = run.await.unwrap().unwrap();

    let replies = reply_requests(&server).await;
    assert_eq!(replies.len(), 1, "{replies:?}");
    assert!(replies[0].contains("in_reply_to_status_id=1"));
    assert!(replies[0].contains("status=%40alice+Help+is+available."));

    assert_eq!(summary.sync.deleted, 1);
    assert_eq!(summary.sync.added, 3);
    assert!(summary.reader.connections >= 3);
    assert_eq!(summary.reader.events, 2);
    assert_eq!(summary.processor.replied, 1);
    assert_eq!(summary.processor.ignored, 1);
    // Dropping the server checks the rules endpoints were hit exactly once.
}

#[tokio::test]
async fn rejected_reply_credentials_fail_before_rules() {
    let server = MockServer::start().await;
    mount_verify(&server, 401).await;
    mount_rules(&server, 0).await;

    let bot = Bot::new(config(&server), credentials()).unwrap();
    let err = bot.run(CancellationToken::new()).await.unwrap_err();

    assert!(matches!(err, BotError::Auth { status: 401, .. }));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn rule_add_failure_is_fatal() {
    let server = MockServer::start().await;
    mount_verify(&server, 200).await;
    Mock::given(method("GET"))
        .and(path(RULES_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(RULES_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid rule"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(STREAM_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let bot = Bot::new(config(&server), credentials()).unwrap();
    let err = bot.run(CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, BotError::RuleSync { status: 400, .. }));
}

#[tokio::test]
async fn rate_limited_stream_is_retried() {
    let server = MockServer::start().await;
    mount_verify(&server, 200).await;
    mount_rules(&server, 1).await;
    Mock::given(method("GET"))
        .and(path(STREAM_PATH))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(3)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(STREAM_PATH))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(60)))
        .with_priority(2)
        .mount(&server)
        .await;

    let bot = Bot::new(config(&server), credentials()).unwrap();
    let cancel = CancellationToken::new();
    let run = tokio::spawn(bot.run(cancel.clone()));

    // Three 429s with 20/40/80ms waits, then the hanging 200.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(!run.is_finished());

    cancel.cancel();
    let summary = run.await.unwrap().unwrap();
    assert_eq!(summary.reader.rate_limited, 3);
}
