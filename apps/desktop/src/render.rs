//! Text rendering of workflow events and errors for the terminal.

use serde::Serialize;
use shared::{AssetId, ErrorCode, ErrorNotice};
use workflow::{SampleSummary, ViewState, WorkflowError, WorkflowEvent, WorkflowStateKind};

pub const SUCCESS_MESSAGE: &str = "Background removed successfully!";

/// Adds a next step to a collaborator failure based on what the message mentions.
pub fn service_failure_hint(message: &str) -> &'static str {
    let lower = message.to_ascii_lowercase();
    if lower.contains("did not answer") || lower.contains("timed out") {
        "The removal service is slow to respond; try again or raise the request timeout."
    } else if lower.contains("connect")
        || lower.contains("dns")
        || lower.contains("transport")
        || lower.contains("unavailable")
    {
        "Removal service unreachable; check the service URL/network and retry."
    } else if lower.contains("401") || lower.contains("403") {
        "The removal service rejected the credentials; check the API key."
    } else if lower.contains("unusable payload") {
        "The removal service answered with something that is not an image."
    } else {
        "Retry with `remove`, or load a different image."
    }
}

pub fn describe_view(view: &ViewState) -> String {
    match view.kind {
        WorkflowStateKind::Empty => {
            "No image loaded. Drag & drop an image here or click to upload (`load`, `drop`, `sample`).".to_string()
        }
        WorkflowStateKind::SourceReady => format!(
            "Image ready. Type `remove` to {}.",
            view.button_label
                .as_deref()
                .unwrap_or("Remove Background")
                .to_ascii_lowercase()
        ),
        WorkflowStateKind::Processing => view
            .button_label
            .clone()
            .unwrap_or_else(|| "Removing...".to_string()),
        WorkflowStateKind::ResultReady => {
            format!("{SUCCESS_MESSAGE} Type `download` to save it.")
        }
    }
}

pub fn describe_notice(notice: &ErrorNotice) -> String {
    match notice.code {
        ErrorCode::ServiceError => format!(
            "error: {} ({})",
            notice.message,
            service_failure_hint(&notice.message)
        ),
        _ => format!("error: {}", notice.message),
    }
}

pub fn describe_error(err: &WorkflowError) -> String {
    describe_notice(&err.notice())
}

/// Returns `None` for events that are not worth showing.
pub fn describe_event(event: &WorkflowEvent) -> Option<String> {
    match event {
        WorkflowEvent::StateChanged(view) => Some(describe_view(view)),
        WorkflowEvent::ErrorReported(notice) => Some(describe_notice(notice)),
        WorkflowEvent::StaleResponseDiscarded { .. } => None,
        WorkflowEvent::Exported(receipt) => Some(format!(
            "Saved {} bytes to {}",
            receipt.bytes,
            receipt.path.display()
        )),
    }
}

pub fn describe_samples(samples: &[SampleSummary]) -> String {
    samples
        .iter()
        .map(|s| {
            format!(
                "{:<10} {:<10} {}",
                s.sample.id,
                s.sample.label,
                if s.ready { "ready" } else { "not loaded" }
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// View state without the inline image payloads.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub state: WorkflowStateKind,
    pub source_id: Option<AssetId>,
    pub result_id: Option<AssetId>,
    pub can_request_removal: bool,
    pub can_download: bool,
    pub error: Option<ErrorNotice>,
    pub pending_completions: usize,
}

impl StatusReport {
    pub fn new(view: ViewState, pending_completions: usize) -> Self {
        Self {
            state: view.kind,
            source_id: view.source_id,
            result_id: view.result_id,
            can_request_removal: view.can_request_removal,
            can_download: view.can_download,
            error: view.error,
            pending_completions,
        }
    }
}
