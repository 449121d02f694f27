use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use research_core::{Pricing, TokenUsage};
use research_engine::{
    Completion, HttpInferenceClient, HttpInferenceSettings, InferenceBackend, InferenceError,
    InferenceFailureKind, RateLimiter, ThrottledInference,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn settings_for(server: &MockServer) -> HttpInferenceSettings {
    HttpInferenceSettings {
        endpoint: format!("{}/v1/chat/completions", server.uri()),
        model: "test-model".into(),
        api_key: Some("secret".into()),
        ..HttpInferenceSettings::default()
    }
}

#[tokio::test]
async fn client_returns_text_and_reported_usage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer secret"))
        .and(body_partial_json(json!({
            "model": "test-model",
            "messages": [{"role": "user", "content": "hello"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "hi there"}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
        })))
        .mount(&server)
        .await;

    let client = HttpInferenceClient::new(settings_for(&server)).unwrap();
    let completion = client.complete("hello").await.expect("completion");
    assert_eq!(completion.text, "hi there");
    assert_eq!(completion.usage, Some(TokenUsage::new(12, 3)));
}

#[tokio::test]
async fn missing_usage_is_reported_as_none() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "ok"}}]
        })))
        .mount(&server)
        .await;

    let client = HttpInferenceClient::new(settings_for(&server)).unwrap();
    let completion = client.complete("hello").await.unwrap();
    assert_eq!(completion.usage, None);
}

#[tokio::test]
async fn http_errors_are_classified() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/busy"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/garbage"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    for (route, expected) in [
        ("/busy", InferenceFailureKind::RateLimited),
        ("/broken", InferenceFailureKind::HttpStatus(500)),
        ("/garbage", InferenceFailureKind::InvalidResponse),
    ] {
        let settings = HttpInferenceSettings {
            endpoint: format!("{}{route}", server.uri()),
            ..HttpInferenceSettings::default()
        };
        let client = HttpInferenceClient::new(settings).unwrap();
        let err = client.complete("hello").await.unwrap_err();
        assert_eq!(err.kind, expected, "route {route}");
    }
}

#[tokio::test]
async fn slow_backend_times_out_at_transport_level() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"choices": [{"message": {"content": "late"}}]}))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let settings = HttpInferenceSettings {
        request_timeout: Duration::from_millis(100),
        ..settings_for(&server)
    };
    let client = HttpInferenceClient::new(settings).unwrap();
    let err = client.complete("hello").await.unwrap_err();
    assert_eq!(err.kind, InferenceFailureKind::Timeout);
}

#[test]
fn malformed_endpoint_is_rejected() {
    let settings = HttpInferenceSettings {
        endpoint: "not a url".into(),
        ..HttpInferenceSettings::default()
    };
    let err = HttpInferenceClient::new(settings).unwrap_err();
    assert_eq!(err.kind, InferenceFailureKind::InvalidConfig);
}

struct SlowBackend {
    delay: Duration,
    usage: Option<TokenUsage>,
}

#[async_trait]
impl InferenceBackend for SlowBackend {
    async fn complete(&self, _prompt: &str) -> Result<Completion, InferenceError> {
        tokio::time::sleep(self.delay).await;
        Ok(Completion {
            text: "three word answer".into(),
            usage: self.usage,
        })
    }
}

fn throttled(backend: SlowBackend, timeout: Duration, refill_per_sec: f64) -> ThrottledInference {
    ThrottledInference::new(
        Arc::new(backend),
        Arc::new(RateLimiter::new(1, refill_per_sec).unwrap()),
        timeout,
        Pricing {
            input_per_million: 1_000_000.0,
            output_per_million: 2_000_000.0,
        },
    )
}

#[tokio::test(start_paused = true)]
async fn per_call_timeout_expiry_is_a_timeout_failure() {
    let inference = throttled(
        SlowBackend {
            delay: Duration::from_secs(30),
            usage: None,
        },
        Duration::from_secs(5),
        1.0,
    );
    let err = inference.call("prompt").await.unwrap_err();
    assert_eq!(err.kind, InferenceFailureKind::Timeout);
}

#[tokio::test(start_paused = true)]
async fn rate_limit_wait_does_not_count_against_the_timeout() {
    let inference = throttled(
        SlowBackend {
            delay: Duration::from_secs(3),
            usage: Some(TokenUsage::new(1, 1)),
        },
        Duration::from_secs(4),
        0.25,
    );
    inference.call("first").await.unwrap();
    // Three seconds refilled 0.75 tokens: one more second of waiting, then three of work.
    let start = tokio::time::Instant::now();
    inference.call("second").await.unwrap();
    assert!(start.elapsed() >= Duration::from_secs(4));
}

#[tokio::test(start_paused = true)]
async fn usage_is_estimated_and_priced_when_backend_reports_none() {
    let inference = throttled(
        SlowBackend {
            delay: Duration::ZERO,
            usage: None,
        },
        Duration::from_secs(5),
        1.0,
    );
    let metered = inference.call("two words").await.unwrap();
    assert!(metered.estimated_usage);
    assert_eq!(metered.usage, TokenUsage::new(2, 3));
    assert!((metered.cost - 8.0).abs() < 1e-9);
}
