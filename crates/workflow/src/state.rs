//! Workflow states, the derived view state, and events published to the presentation layer.

use std::fmt;

use serde::{Deserialize, Serialize};
use shared::{AssetId, ErrorNotice, ImageAsset, RequestId};

use crate::export::ExportReceipt;

pub const REMOVE_BUTTON_LABEL: &str = "Remove Background";
pub const REMOVING_BUTTON_LABEL: &str = "Removing...";

/// Ties one in-flight collaborator call to the source it was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessingRequest {
    pub id: RequestId,
    pub source: AssetId,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum WorkflowState {
    #[default]
    Empty,
    SourceReady {
        source: ImageAsset,
    },
    Processing {
        source: ImageAsset,
        request: ProcessingRequest,
    },
    ResultReady {
        source: ImageAsset,
        result: ImageAsset,
    },
}

impl WorkflowState {
    pub fn kind(&self) -> WorkflowStateKind {
        match self {
            Self::Empty => WorkflowStateKind::Empty,
            Self::SourceReady { .. } => WorkflowStateKind::SourceReady,
            Self::Processing { .. } => WorkflowStateKind::Processing,
            Self::ResultReady { .. } => WorkflowStateKind::ResultReady,
        }
    }

    pub fn source(&self) -> Option<&ImageAsset> {
        match self {
            Self::Empty => None,
            Self::SourceReady { source }
            | Self::Processing { source, .. }
            | Self::ResultReady { source, .. } => Some(source),
        }
    }

    pub fn result(&self) -> Option<&ImageAsset> {
        match self {
            Self::ResultReady { result, .. } => Some(result),
            _ => None,
        }
    }

    pub fn outstanding_request(&self) -> Option<ProcessingRequest> {
        match self {
            Self::Processing { request, .. } => Some(*request),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStateKind {
    Empty,
    SourceReady,
    Processing,
    ResultReady,
}

impl WorkflowStateKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::SourceReady => "source_ready",
            Self::Processing => "processing",
            Self::ResultReady => "result_ready",
        }
    }
}

impl fmt::Display for WorkflowStateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a rendering layer needs, derived from the current state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewState {
    pub kind: WorkflowStateKind,
    pub source_id: Option<AssetId>,
    pub source_ref: Option<String>,
    pub result_id: Option<AssetId>,
    pub result_ref: Option<String>,
    pub can_request_removal: bool,
    pub is_processing: bool,
    pub can_download: bool,
    pub can_clear: bool,
    pub button_label: Option<String>,
    pub error: Option<ErrorNotice>,
}

impl ViewState {
    pub fn derive(state: &WorkflowState, error: Option<&ErrorNotice>) -> Self {
        let kind = state.kind();
        let button_label = match kind {
            WorkflowStateKind::SourceReady => Some(REMOVE_BUTTON_LABEL.to_string()),
            WorkflowStateKind::Processing => Some(REMOVING_BUTTON_LABEL.to_string()),
            WorkflowStateKind::Empty | WorkflowStateKind::ResultReady => None,
        };

        Self {
            kind,
            source_id: state.source().map(ImageAsset::id),
            source_ref: state.source().map(ImageAsset::display_ref),
            result_id: state.result().map(ImageAsset::id),
            result_ref: state.result().map(ImageAsset::display_ref),
            can_request_removal: kind == WorkflowStateKind::SourceReady,
            is_processing: kind == WorkflowStateKind::Processing,
            can_download: kind == WorkflowStateKind::ResultReady,
            can_clear: kind != WorkflowStateKind::Empty,
            button_label,
            error: error.cloned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
    Applied(WorkflowStateKind),
    Discarded,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum WorkflowEvent {
    StateChanged(ViewState),
    ErrorReported(ErrorNotice),
    StaleResponseDiscarded { request: ProcessingRequest },
    Exported(ExportReceipt),
}
