use annie_core::{AppSettings, Character, ImageRenderer};
use annie_image::{ComfyClient, ImageError, PollPolicy, ProbeOutcome};
use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_client() -> ComfyClient {
    ComfyClient::default().with_poll_policy(PollPolicy {
        initial_delay: Duration::ZERO,
        interval: Duration::from_millis(1),
        max_attempts: 60,
    })
}

fn settings_for(server: &MockServer) -> AppSettings {
    let mut s = AppSettings::default();
    s.comfy_url = format!("{}/", server.uri());
    s
}

fn annie() -> Character {
    let mut c = Character::new("Annie", "v-standard");
    c.appearance = "silver hair".into();
    c
}

async fn mount_submit(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/prompt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"prompt_id": "p1", "number": 0})))
        .mount(server)
        .await;
}

// ============================================================================
// Generation
// ============================================================================

#[tokio::test]
async fn test_generate_returns_view_url() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/prompt"))
        .and(header("ngrok-skip-browser-warning", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"prompt_id": "p1"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/history/p1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "p1": {"outputs": {"9": {"images": [{"filename": "Annie_Gen_00001_.png"}]}}}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let settings = settings_for(&server);
    let url = fast_client()
        .render("a cat on a roof", &annie(), &settings)
        .await
        .unwrap();
    assert_eq!(url, format!("{}/view?filename=Annie_Gen_00001_.png", server.uri()));

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert!(body["client_id"].as_str().is_some());
    let positive = body["prompt"]["6"]["inputs"]["text"].as_str().unwrap();
    assert!(positive.contains("a cat on a roof, silver hair"));
    assert_eq!(body["prompt"]["9"]["class_type"], "SaveImage");
}

#[tokio::test]
async fn test_poll_gives_up_after_sixty_attempts() {
    let server = MockServer::start().await;
    mount_submit(&server).await;
    Mock::given(method("GET"))
        .and(path("/history/p1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(60)
        .mount(&server)
        .await;

    let err = fast_client()
        .generate("x", &annie(), &settings_for(&server))
        .await
        .unwrap_err();
    assert!(matches!(err, ImageError::Exhausted(60)));
}

#[tokio::test]
async fn test_html_and_garbage_polls_count_as_attempts() {
    let server = MockServer::start().await;
    mount_submit(&server).await;
    Mock::given(method("GET"))
        .and(path("/history/p1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<!DOCTYPE html><html></html>"))
        .up_to_n_times(30)
        .expect(30)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/history/p1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
        .expect(30)
        .mount(&server)
        .await;

    let settings = settings_for(&server);
    assert_eq!(fast_client().render("x", &annie(), &settings).await, None);
}

#[tokio::test]
async fn test_submit_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/prompt"))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid prompt"))
        .mount(&server)
        .await;

    let err = fast_client()
        .generate("x", &annie(), &settings_for(&server))
        .await
        .unwrap_err();
    match err {
        ImageError::Status { status, body } => {
            assert_eq!(status, 400);
            assert_eq!(body, "invalid prompt");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_submit_gives_up_on_silent_server() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/prompt"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
        .mount(&server)
        .await;

    let started = std::time::Instant::now();
    let err = fast_client()
        .with_request_timeout(Duration::from_millis(200))
        .generate("x", &annie(), &settings_for(&server))
        .await
        .unwrap_err();
    match err {
        ImageError::Transport(e) => assert!(e.is_timeout()),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_submit_interstitial() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/prompt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("  <html>warning</html>"))
        .mount(&server)
        .await;

    let err = fast_client()
        .generate("x", &annie(), &settings_for(&server))
        .await
        .unwrap_err();
    assert!(matches!(err, ImageError::Interstitial));
}

// ============================================================================
// Resources
// ============================================================================

#[tokio::test]
async fn test_fetch_resources() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/object_info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "CheckpointLoaderSimple": {"input": {"required": {"ckpt_name": [["anime.safetensors"]]}}},
            "LoraLoader": {"input": {"required": {"lora_name": [["detail.safetensors"]]}}},
            "KSampler": {"input": {"required": {"sampler_name": [["euler"]], "scheduler": [["normal"]]}}}
        })))
        .mount(&server)
        .await;

    let res = fast_client().fetch_resources(&server.uri(), false).await.unwrap();
    assert_eq!(res.checkpoints, vec!["anime.safetensors"]);
    assert_eq!(res.loras, vec!["detail.safetensors"]);

    let mut settings = AppSettings::default();
    res.apply_to(&mut settings);
    assert_eq!(settings.saved_loras, vec!["None", "detail.safetensors"]);
}

#[tokio::test]
async fn test_fetch_resources_failures() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/object_info"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;
    assert_eq!(fast_client().fetch_resources(&server.uri(), true).await, None);

    let html = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
        .mount(&html)
        .await;
    assert_eq!(fast_client().fetch_resources(&html.uri(), true).await, None);
}

// ============================================================================
// Probe
// ============================================================================

#[tokio::test]
async fn test_probe_connected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/system_stats"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"system": {}})))
        .mount(&server)
        .await;
    assert_eq!(
        fast_client().probe(&server.uri(), false, None).await,
        ProbeOutcome::Connected
    );
}

#[tokio::test]
async fn test_probe_falls_back_to_root() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/system_stats"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string("<html>tunnel</html>"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let outcome = fast_client().probe(&server.uri(), true, None).await;
    assert_eq!(outcome, ProbeOutcome::Interstitial);
    assert_eq!(outcome.report().error_type, Some("ngrok_interstitial"));
}

#[tokio::test]
async fn test_probe_bad_gateway_and_status() {
    let gateway = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&gateway)
        .await;
    assert_eq!(
        fast_client().probe(&gateway.uri(), false, None).await,
        ProbeOutcome::BadGateway
    );

    let missing = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&missing)
        .await;
    assert_eq!(
        fast_client().probe(&missing.uri(), false, None).await,
        ProbeOutcome::HttpError(403)
    );
}

#[tokio::test]
async fn test_probe_timeout_and_network() {
    let slow = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&slow)
        .await;
    let client = fast_client().with_probe_budget(Duration::from_millis(50));
    assert_eq!(client.probe(&slow.uri(), false, None).await, ProbeOutcome::Timeout);

    assert_eq!(
        fast_client().probe("http://127.0.0.1:1", true, None).await,
        ProbeOutcome::Network { custom_header: true }
    );
}
