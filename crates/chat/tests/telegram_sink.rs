use chat::{LogSink, Message, MessageSink, TelegramConfig, TelegramSink};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sink(server: &MockServer) -> TelegramSink {
    TelegramSink::new(TelegramConfig::new("123:abc", "-1001").with_api_base(server.uri()))
}

#[tokio::test]
async fn posts_text_to_configured_chat() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bot123:abc/sendMessage"))
        .and(body_partial_json(json!({
            "chat_id": "-1001",
            "text": "The table has been updated"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": {"message_id": 1}
        })))
        .expect(1)
        .mount(&server)
        .await;

    sink(&server)
        .send("The table has been updated")
        .await
        .expect("send should succeed");
}

#[tokio::test]
async fn preformatted_blocks_use_html_pre() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bot123:abc/sendMessage"))
        .and(body_partial_json(json!({
            "chat_id": "-1001",
            "parse_mode": "HTML",
            "text": "<pre>Rank | Team\n1    | A&amp;B &lt;FC&gt;</pre>"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": {"message_id": 2}
        })))
        .expect(1)
        .mount(&server)
        .await;

    sink(&server)
        .deliver(&Message::Preformatted("Rank | Team\n1    | A&B <FC>".into()))
        .await
        .expect("table should be delivered");
}

#[tokio::test]
async fn surfaces_api_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bot123:abc/sendMessage"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "ok": false,
            "error_code": 400,
            "description": "Bad Request: chat not found"
        })))
        .mount(&server)
        .await;

    let err = sink(&server)
        .send("hello")
        .await
        .expect_err("rejection should fail the send");
    assert!(err.to_string().contains("chat not found"));
}

#[tokio::test]
async fn log_sink_never_fails() {
    LogSink.send("anything").await.expect("log sink");
    LogSink
        .deliver(&Message::Preformatted("| a | b |".into()))
        .await
        .expect("log sink");
}
