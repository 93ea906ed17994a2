use super::*;
use std::{
    fs,
    path::PathBuf,
    sync::atomic::{AtomicUsize, Ordering},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use removal_service::{SimulatedRemovalService, WithTimeout};
use shared::{AssetId, AssetOrigin};
use tokio::sync::{oneshot, Mutex};

use crate::export::FileSystemExport;

const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];

type Gate = oneshot::Sender<Result<ImageAsset, ServiceError>>;

/// Collaborator whose answers are released by the test, in any order.
#[derive(Clone, Default)]
struct GatedService {
    gates: Arc<Mutex<Vec<(AssetId, Gate)>>>,
    calls: Arc<AtomicUsize>,
}

impl GatedService {
    async fn wait_for_calls(&self, count: usize) {
        for _ in 0..500 {
            if self.gates.lock().await.len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("collaborator was not called {count} times");
    }

    async fn release(&self, source: AssetId, outcome: Result<ImageAsset, ServiceError>) {
        let mut gates = self.gates.lock().await;
        let index = gates
            .iter()
            .position(|(id, _)| *id == source)
            .expect("gate for source");
        let (_, gate) = gates.remove(index);
        gate.send(outcome).expect("request task alive");
    }
}

#[async_trait]
impl RemovalService for GatedService {
    async fn remove_background(&self, asset: ImageAsset) -> Result<ImageAsset, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.gates.lock().await.push((asset.id(), tx));
        rx.await
            .unwrap_or_else(|_| Err(ServiceError::Unavailable("gate dropped".to_string())))
    }
}

fn temp_dir(tag: &str) -> PathBuf {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    std::env::temp_dir().join(format!("bgremove_session_{tag}_{suffix}"))
}

fn selection(name: &str) -> FileSelection {
    FileSelection {
        file_name: name.to_string(),
        declared_mime: Some("image/jpeg".to_string()),
        bytes: JPEG.to_vec(),
    }
}

fn processed() -> ImageAsset {
    ImageAsset::from_bytes(PNG.to_vec(), AssetOrigin::RemovalService).expect("png")
}

fn gated_session(service: &GatedService) -> WorkflowSession {
    WorkflowSession::new(
        Arc::new(service.clone()),
        Arc::new(FileSystemExport::new(temp_dir("unused"))),
    )
}

fn drain(rx: &mut broadcast::Receiver<WorkflowEvent>) -> Vec<WorkflowEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn picks_removes_and_downloads_with_simulated_service() {
    let out_dir = temp_dir("e2e");
    let mut session = WorkflowSession::new(
        Arc::new(SimulatedRemovalService::new(Duration::from_millis(5))),
        Arc::new(FileSystemExport::new(&out_dir)),
    );

    session
        .load_file_selection(selection("portrait.jpg"))
        .expect("load");
    session.request_removal().expect("request");
    let outcome = session.next_completion().await.expect("completion");

    assert_eq!(outcome, CompletionOutcome::Applied(WorkflowStateKind::ResultReady));
    let receipt = session.download().expect("download");
    assert_eq!(receipt.path, out_dir.join("background-removed-image.jpg"));
    assert_eq!(fs::read(&receipt.path).expect("saved file"), JPEG);
    assert_eq!(session.kind(), WorkflowStateKind::ResultReady);

    fs::remove_dir_all(out_dir).expect("cleanup");
}

#[tokio::test]
async fn request_returns_before_collaborator_answers() {
    let service = GatedService::default();
    let mut session = gated_session(&service);
    session.load_file_selection(selection("x.jpg")).expect("load");

    let request = session.request_removal().expect("request");

    assert_eq!(session.kind(), WorkflowStateKind::Processing);
    assert_eq!(session.pending_completions(), 1);
    service.wait_for_calls(1).await;
    assert!(session.apply_ready_completions().is_empty());

    service.release(request.source, Ok(processed())).await;
    let outcome = session.next_completion().await.expect("completion");
    assert_eq!(outcome, CompletionOutcome::Applied(WorkflowStateKind::ResultReady));
    assert_eq!(session.pending_completions(), 0);
}

#[tokio::test]
async fn second_request_while_processing_is_rejected() {
    let service = GatedService::default();
    let mut session = gated_session(&service);
    session.load_file_selection(selection("x.jpg")).expect("load");
    session.request_removal().expect("first request");

    let err = session.request_removal().expect_err("already processing");

    assert!(matches!(
        err,
        WorkflowError::InvalidState {
            state: WorkflowStateKind::Processing,
            ..
        }
    ));
    service.wait_for_calls(1).await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(service.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn response_for_superseded_source_is_ignored() {
    let service = GatedService::default();
    let mut session = gated_session(&service);
    session.load_file_selection(selection("x.jpg")).expect("load x");
    let stale = session.request_removal().expect("request x");
    service.wait_for_calls(1).await;

    session.load_file_selection(selection("z.jpg")).expect("load z");
    let z_id = session.view().source_id.expect("z loaded");
    service.release(stale.source, Ok(processed())).await;
    let outcome = session.next_completion().await.expect("stale completion");

    assert_eq!(outcome, CompletionOutcome::Discarded);
    let view = session.view();
    assert_eq!(view.kind, WorkflowStateKind::SourceReady);
    assert_eq!(view.source_id, Some(z_id));
    assert_eq!(view.result_id, None);
}

#[tokio::test]
async fn clearing_while_processing_abandons_request() {
    let service = GatedService::default();
    let mut session = gated_session(&service);
    session.load_file_selection(selection("x.jpg")).expect("load");
    let request = session.request_removal().expect("request");
    service.wait_for_calls(1).await;

    session.clear_source();
    service.release(request.source, Ok(processed())).await;

    assert_eq!(
        session.next_completion().await,
        Some(CompletionOutcome::Discarded)
    );
    assert_eq!(session.kind(), WorkflowStateKind::Empty);
}

#[tokio::test]
async fn failure_is_published_exactly_once_and_allows_retry() {
    let service = GatedService::default();
    let mut session = gated_session(&service);
    let mut events = session.subscribe_events();
    session.load_file_selection(selection("x.jpg")).expect("load");
    let request = session.request_removal().expect("request");
    service.wait_for_calls(1).await;

    service
        .release(
            request.source,
            Err(ServiceError::Status {
                status: 500,
                body: "boom".to_string(),
            }),
        )
        .await;
    let outcome = session.next_completion().await.expect("failure");

    assert_eq!(outcome, CompletionOutcome::Applied(WorkflowStateKind::SourceReady));
    let errors: Vec<_> = drain(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            WorkflowEvent::ErrorReported(notice) => Some(notice),
            _ => None,
        })
        .collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, shared::ErrorCode::ServiceError);
    assert!(errors[0].message.contains("500"));
    assert!(session.view().error.is_some());

    session.request_removal().expect("retry accepted");
    assert!(session.view().error.is_none());
}

#[tokio::test]
async fn boundary_timeout_lands_back_in_source_ready() {
    let service = GatedService::default();
    let mut session = WorkflowSession::new(
        Arc::new(WithTimeout::new(service.clone(), Duration::from_millis(20))),
        Arc::new(FileSystemExport::new(temp_dir("unused"))),
    );
    session.load_file_selection(selection("x.jpg")).expect("load");
    session.request_removal().expect("request");

    let outcome = session.next_completion().await.expect("timeout completion");

    assert_eq!(outcome, CompletionOutcome::Applied(WorkflowStateKind::SourceReady));
    let notice = session.view().error.expect("timeout surfaced");
    assert!(notice.message.contains("did not answer"));
}

struct PanickingService;

#[async_trait]
impl RemovalService for PanickingService {
    async fn remove_background(&self, _asset: ImageAsset) -> Result<ImageAsset, ServiceError> {
        panic!("collaborator crashed");
    }
}

#[tokio::test]
async fn panicking_collaborator_lands_back_in_source_ready() {
    let mut session = WorkflowSession::new(
        Arc::new(PanickingService),
        Arc::new(FileSystemExport::new(temp_dir("unused"))),
    );
    session.load_file_selection(selection("x.jpg")).expect("load");
    session.request_removal().expect("request");

    let outcome = tokio::time::timeout(Duration::from_secs(2), session.next_completion())
        .await
        .expect("completion must arrive");

    assert_eq!(
        outcome,
        Some(CompletionOutcome::Applied(WorkflowStateKind::SourceReady))
    );
    assert_eq!(session.pending_completions(), 0);
    let notice = session.view().error.expect("failure surfaced");
    assert_eq!(notice.code, shared::ErrorCode::ServiceError);
    assert!(notice.message.contains("unavailable"), "{}", notice.message);
    session.request_removal().expect("retry accepted");
}

#[tokio::test]
async fn next_completion_is_none_when_idle() {
    let service = GatedService::default();
    let mut session = gated_session(&service);
    assert_eq!(session.next_completion().await, None);
}

#[tokio::test]
async fn drop_channel_always_suppresses_default() {
    let service = GatedService::default();
    let mut session = gated_session(&service);

    let rejected = session.load_drop(DropEvent {
        files: vec![FileSelection {
            file_name: "readme.md".to_string(),
            declared_mime: Some("text/markdown".to_string()),
            bytes: b"# hi".to_vec(),
        }],
    });
    assert!(rejected.suppress_default);
    assert!(matches!(rejected.loaded, Err(WorkflowError::InvalidInput(_))));
    assert_eq!(session.kind(), WorkflowStateKind::Empty);

    let accepted = session.load_drop(DropEvent {
        files: vec![selection("dropped.jpg")],
    });
    assert!(accepted.suppress_default);
    assert!(accepted.loaded.is_ok());
    assert_eq!(session.kind(), WorkflowStateKind::SourceReady);
}

#[tokio::test]
async fn selecting_a_sample_loads_a_fresh_source() {
    let service = GatedService::default();
    let mut session = gated_session(&service);
    let mut gallery = SampleGallery::preset();
    gallery
        .insert_prefetched("sample-2", PNG.to_vec())
        .expect("seed");

    session.select_sample(&gallery, "sample-2").expect("select");
    let first = session.view().source_id;
    session.select_sample(&gallery, "sample-2").expect("select again");

    assert_eq!(session.kind(), WorkflowStateKind::SourceReady);
    assert_ne!(session.view().source_id, first);
    assert!(matches!(
        session.select_sample(&gallery, "sample-1"),
        Err(WorkflowError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn download_before_result_exports_nothing() {
    let out_dir = temp_dir("premature");
    let mut session = WorkflowSession::new(
        Arc::new(GatedService::default()),
        Arc::new(FileSystemExport::new(&out_dir)),
    );
    session.load_file_selection(selection("x.jpg")).expect("load");

    assert!(matches!(
        session.download(),
        Err(WorkflowError::InvalidState { .. })
    ));
    assert!(!out_dir.exists());
}
