//! Image workflow state machine.
//!
//! Every operation is synchronous and total: it either transitions to one of the four
//! [`WorkflowState`]s or returns an error and leaves the state untouched. Collaborator
//! completions carry the [`ProcessingRequest`] they were issued for and are applied only
//! while that exact request is still outstanding against the current source.

use removal_service::ServiceError;
use serde::{Deserialize, Serialize};
use shared::{AssetId, AssetOrigin, ErrorNotice, ImageAsset, RequestId};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::{
    error::WorkflowError,
    export::{self, ExportReceipt, ExportSink},
    state::{
        CompletionOutcome, ProcessingRequest, ViewState, WorkflowEvent, WorkflowState,
        WorkflowStateKind,
    },
};

/// A request that has been accepted and must now be sent to the collaborator.
#[derive(Debug, Clone)]
pub struct RemovalJob {
    pub request: ProcessingRequest,
    pub source: ImageAsset,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(try_from = "ControllerSnapshot")]
pub struct WorkflowController {
    state: WorkflowState,
    last_request_id: RequestId,
    last_error: Option<ErrorNotice>,
    #[serde(skip)]
    events: Vec<WorkflowEvent>,
}

impl WorkflowController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn kind(&self) -> WorkflowStateKind {
        self.state.kind()
    }

    pub fn source(&self) -> Option<&ImageAsset> {
        self.state.source()
    }

    pub fn result(&self) -> Option<&ImageAsset> {
        self.state.result()
    }

    pub fn last_error(&self) -> Option<&ErrorNotice> {
        self.last_error.as_ref()
    }

    pub fn view(&self) -> ViewState {
        ViewState::derive(&self.state, self.last_error.as_ref())
    }

    /// Drains events queued by transitions since the previous call.
    pub fn take_events(&mut self) -> Vec<WorkflowEvent> {
        std::mem::take(&mut self.events)
    }

    /// Replaces whatever is loaded. An outstanding request is abandoned; its completion
    /// will be discarded when it arrives.
    pub fn load_source(&mut self, asset: ImageAsset) {
        let previous = self.state.kind();
        if let Some(request) = self.state.outstanding_request() {
            debug!(
                request_id = %request.id,
                source_id = %request.source,
                "source replaced while processing; abandoning request"
            );
        }
        debug!(asset_id = %asset.id(), origin = asset.origin().label(), "loading source image");
        self.state = WorkflowState::SourceReady { source: asset };
        self.last_error = None;
        self.transitioned("load_source", previous);
    }

    /// Validates a raw payload, then loads it. Invalid payloads leave the state unchanged.
    pub fn load_source_bytes(
        &mut self,
        bytes: impl Into<Vec<u8>>,
        origin: AssetOrigin,
    ) -> Result<(), WorkflowError> {
        let asset = ImageAsset::from_bytes(bytes, origin).map_err(|err| {
            warn!("rejected source payload: {err}");
            WorkflowError::from(err)
        })?;
        self.load_source(asset);
        Ok(())
    }

    pub fn clear_source(&mut self) {
        let previous = self.state.kind();
        self.state = WorkflowState::Empty;
        self.last_error = None;
        self.transitioned("clear_source", previous);
    }

    pub fn request_removal(&mut self) -> Result<RemovalJob, WorkflowError> {
        let WorkflowState::SourceReady { source } = &self.state else {
            return Err(self.reject("request removal"));
        };

        let source = source.clone();
        let request = ProcessingRequest {
            id: self.last_request_id.next(),
            source: source.id(),
        };
        self.last_request_id = request.id;
        self.state = WorkflowState::Processing {
            source: source.clone(),
            request,
        };
        self.last_error = None;
        self.transitioned("request_removal", WorkflowStateKind::SourceReady);

        Ok(RemovalJob { request, source })
    }

    pub fn removal_succeeded(
        &mut self,
        request: ProcessingRequest,
        result: ImageAsset,
    ) -> CompletionOutcome {
        match std::mem::take(&mut self.state) {
            WorkflowState::Processing {
                source,
                request: outstanding,
            } if outstanding == request && source.id() == request.source => {
                debug!(request_id = %request.id, result_id = %result.id(), "removal succeeded");
                self.state = WorkflowState::ResultReady { source, result };
                self.transitioned("removal_succeeded", WorkflowStateKind::Processing);
                CompletionOutcome::Applied(WorkflowStateKind::ResultReady)
            }
            other => {
                self.state = other;
                self.discard(request, "success")
            }
        }
    }

    pub fn removal_failed(
        &mut self,
        request: ProcessingRequest,
        cause: ServiceError,
    ) -> CompletionOutcome {
        match std::mem::take(&mut self.state) {
            WorkflowState::Processing {
                source,
                request: outstanding,
            } if outstanding == request && source.id() == request.source => {
                error!(request_id = %request.id, source_id = %source.id(), "error removing background: {cause}");
                let notice = WorkflowError::Service(cause).notice();
                self.state = WorkflowState::SourceReady { source };
                self.last_error = Some(notice.clone());
                self.transitioned("removal_failed", WorkflowStateKind::Processing);
                self.events.push(WorkflowEvent::ErrorReported(notice));
                CompletionOutcome::Applied(WorkflowStateKind::SourceReady)
            }
            other => {
                self.state = other;
                self.discard(request, "failure")
            }
        }
    }

    /// Saves the result through `sink`. Never changes the state.
    pub fn download(&mut self, sink: &dyn ExportSink) -> Result<ExportReceipt, WorkflowError> {
        let WorkflowState::ResultReady { result, .. } = &self.state else {
            return Err(self.reject("download"));
        };

        let receipt = export::export(sink, result).map_err(|err| {
            warn!(result_id = %result.id(), "export failed: {err}");
            WorkflowError::Export(err)
        })?;
        self.events.push(WorkflowEvent::Exported(receipt.clone()));
        Ok(receipt)
    }

    fn reject(&self, operation: &'static str) -> WorkflowError {
        let state = self.state.kind();
        warn!(operation, %state, "rejected operation");
        WorkflowError::InvalidState { operation, state }
    }

    fn discard(&mut self, request: ProcessingRequest, outcome: &'static str) -> CompletionOutcome {
        debug!(
            request_id = %request.id,
            source_id = %request.source,
            outcome,
            state = %self.state.kind(),
            "discarding stale removal response"
        );
        self.events
            .push(WorkflowEvent::StaleResponseDiscarded { request });
        CompletionOutcome::Discarded
    }

    fn transitioned(&mut self, operation: &'static str, from: WorkflowStateKind) {
        let to = self.state.kind();
        debug!(operation, %from, %to, "workflow transition");
        self.events.push(WorkflowEvent::StateChanged(self.view()));
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidSnapshot {
    #[error("outstanding request {request} targets asset {request_source}, but the loaded source is {source_id}")]
    RequestSourceMismatch {
        request: RequestId,
        request_source: AssetId,
        source_id: AssetId,
    },
    #[error("outstanding request {request} is newer than the last issued request {last_issued}")]
    RequestNotIssued {
        request: RequestId,
        last_issued: RequestId,
    },
}

#[derive(Deserialize)]
struct ControllerSnapshot {
    state: WorkflowState,
    last_request_id: RequestId,
    last_error: Option<ErrorNotice>,
}

impl TryFrom<ControllerSnapshot> for WorkflowController {
    type Error = InvalidSnapshot;

    fn try_from(snapshot: ControllerSnapshot) -> Result<Self, Self::Error> {
        if let WorkflowState::Processing { source, request } = &snapshot.state {
            if request.source != source.id() {
                return Err(InvalidSnapshot::RequestSourceMismatch {
                    request: request.id,
                    request_source: request.source,
                    source_id: source.id(),
                });
            }
            if request.id > snapshot.last_request_id {
                return Err(InvalidSnapshot::RequestNotIssued {
                    request: request.id,
                    last_issued: snapshot.last_request_id,
                });
            }
        }
        Ok(Self {
            state: snapshot.state,
            last_request_id: snapshot.last_request_id,
            last_error: snapshot.last_error,
            events: Vec::new(),
        })
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
