use super::*;
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use tokio::{net::TcpListener, sync::Mutex};

const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR-result";
const JPEG_BYTES: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];

#[derive(Clone, Default)]
struct ServerState {
    received: Arc<Mutex<Vec<(Option<String>, Option<String>, Vec<u8>)>>>,
}

fn source_asset() -> ImageAsset {
    ImageAsset::from_bytes(
        JPEG_BYTES.to_vec(),
        AssetOrigin::FilePicker {
            file_name: "portrait.jpg".to_string(),
        },
    )
    .expect("jpeg source")
}

async fn handle_remove(
    State(state): State<ServerState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let api_key = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    state
        .received
        .lock()
        .await
        .push((content_type, api_key, body.to_vec()));
    ([(header::CONTENT_TYPE, "image/png")], PNG_BYTES)
}

async fn handle_overloaded() -> impl IntoResponse {
    (StatusCode::SERVICE_UNAVAILABLE, "model warming up")
}

async fn handle_garbage() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/html")], "<html>oops</html>")
}

async fn spawn_removal_server() -> (String, ServerState) {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let state = ServerState::default();
    let app = Router::new()
        .route("/remove", post(handle_remove))
        .route("/overloaded", post(handle_overloaded))
        .route("/garbage", post(handle_garbage))
        .route("/samples/dog.png", get(|| async { PNG_BYTES }))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}"), state)
}

#[tokio::test]
async fn http_service_posts_source_bytes_and_returns_validated_result() {
    let (base, state) = spawn_removal_server().await;
    let service = HttpRemovalService::new(
        &format!("{base}/remove"),
        Some("secret-key".to_string()),
        Some(Duration::from_secs(5)),
    )
    .expect("service");
    let source = source_asset();

    let result = service
        .remove_background(source.clone())
        .await
        .expect("removal succeeds");

    assert_eq!(result.mime_type(), "image/png");
    assert_eq!(result.bytes(), PNG_BYTES);
    assert_eq!(result.origin(), &AssetOrigin::RemovalService);
    assert_ne!(result.id(), source.id());

    let received = state.received.lock().await;
    assert_eq!(received.len(), 1);
    let (content_type, api_key, body) = &received[0];
    assert_eq!(content_type.as_deref(), Some("image/jpeg"));
    assert_eq!(api_key.as_deref(), Some("secret-key"));
    assert_eq!(body.as_slice(), JPEG_BYTES);
}

#[tokio::test]
async fn http_service_omits_api_key_when_not_configured() {
    let (base, state) = spawn_removal_server().await;
    let service =
        HttpRemovalService::new(&format!("{base}/remove"), None, None).expect("service");

    service
        .remove_background(source_asset())
        .await
        .expect("removal succeeds");

    let received = state.received.lock().await;
    assert_eq!(received[0].1, None);
}

#[tokio::test]
async fn http_service_surfaces_non_success_status() {
    let (base, _) = spawn_removal_server().await;
    let service =
        HttpRemovalService::new(&format!("{base}/overloaded"), None, None).expect("service");

    let err = service
        .remove_background(source_asset())
        .await
        .expect_err("503 must fail");

    assert_eq!(
        err,
        ServiceError::Status {
            status: 503,
            body: "model warming up".to_string(),
        }
    );
}

#[tokio::test]
async fn http_service_rejects_non_image_response() {
    let (base, _) = spawn_removal_server().await;
    let service =
        HttpRemovalService::new(&format!("{base}/garbage"), None, None).expect("service");

    let err = service
        .remove_background(source_asset())
        .await
        .expect_err("html is not an image");

    assert!(matches!(err, ServiceError::InvalidResponse(_)), "{err:?}");
}

#[tokio::test]
async fn http_service_reports_transport_failure_for_closed_port() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let service =
        HttpRemovalService::new(&format!("http://{addr}/remove"), None, None).expect("service");

    let err = service
        .remove_background(source_asset())
        .await
        .expect_err("nothing listens");

    assert!(matches!(err, ServiceError::Transport(_)), "{err:?}");
}

#[test]
fn invalid_endpoint_is_rejected_up_front() {
    let err = HttpRemovalService::new("not a url", None, None)
        .err()
        .expect("must fail");
    assert!(matches!(err, ServiceError::InvalidEndpoint(_)));
}

#[tokio::test]
async fn sample_fetcher_downloads_bytes() {
    let (base, _) = spawn_removal_server().await;
    let fetcher = HttpSampleFetcher::default();

    let bytes = fetcher
        .fetch(&format!("{base}/samples/dog.png"))
        .await
        .expect("fetch sample");

    assert_eq!(bytes, PNG_BYTES);
}

#[tokio::test]
async fn sample_fetcher_maps_missing_sample_to_status_error() {
    let (base, _) = spawn_removal_server().await;
    let fetcher = HttpSampleFetcher::default();

    let err = fetcher
        .fetch(&format!("{base}/samples/missing.png"))
        .await
        .expect_err("404");

    assert!(matches!(err, ServiceError::Status { status: 404, .. }));
}

#[tokio::test]
async fn sample_fetcher_gives_up_on_silent_host() {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    let fetcher = HttpSampleFetcher::with_timeout(Duration::from_millis(100));

    let outcome = tokio::time::timeout(
        Duration::from_secs(3),
        fetcher.fetch(&format!("http://{addr}/samples/dog.png")),
    )
    .await
    .expect("fetch must not hang");

    assert_eq!(
        outcome,
        Err(ServiceError::Timeout {
            after: Duration::from_millis(100)
        })
    );
}

#[tokio::test]
async fn simulated_service_answers_with_copy_of_source() {
    let service = SimulatedRemovalService::new(Duration::from_millis(5));
    let source = source_asset();

    let result = service
        .remove_background(source.clone())
        .await
        .expect("simulated removal");

    assert_ne!(result.id(), source.id());
    assert_eq!(result.bytes(), source.bytes());
    assert_eq!(result.origin(), &AssetOrigin::RemovalService);
}

#[tokio::test]
async fn simulated_service_prefers_fixed_result() {
    let fixed = ImageAsset::from_bytes(PNG_BYTES.to_vec(), AssetOrigin::RemovalService)
        .expect("fixed png");
    let service =
        SimulatedRemovalService::new(Duration::from_millis(1)).with_fixed_result(fixed.clone());

    let first = service
        .remove_background(source_asset())
        .await
        .expect("first");
    let second = service
        .remove_background(source_asset())
        .await
        .expect("second");

    assert_eq!(first.bytes(), PNG_BYTES);
    assert_ne!(first.id(), fixed.id());
    assert_ne!(first.id(), second.id());
}

#[tokio::test]
async fn timeout_wrapper_fails_slow_collaborator() {
    let slow = SimulatedRemovalService::new(Duration::from_secs(5));
    let service = WithTimeout::new(slow, Duration::from_millis(20));

    let err = service
        .remove_background(source_asset())
        .await
        .expect_err("must time out");

    assert_eq!(
        err,
        ServiceError::Timeout {
            after: Duration::from_millis(20)
        }
    );
}

#[tokio::test]
async fn timeout_wrapper_passes_through_fast_answers() {
    let fast = SimulatedRemovalService::new(Duration::from_millis(1));
    let service = WithTimeout::new(fast, Duration::from_secs(5));

    assert!(service.remove_background(source_asset()).await.is_ok());
}

#[tokio::test]
async fn unavailable_service_always_fails() {
    let service: Arc<dyn RemovalService> = Arc::new(UnavailableRemovalService);

    let err = service
        .remove_background(source_asset())
        .await
        .expect_err("nothing configured");

    assert!(matches!(err, ServiceError::Unavailable(_)));
}
