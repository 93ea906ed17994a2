//! Async driver around [`WorkflowController`].
//!
//! The session is owned by one task. Collaborator calls run on spawned tasks and report
//! back through a channel; their completions are applied only when the owner polls
//! [`WorkflowSession::next_completion`] or [`WorkflowSession::apply_ready_completions`], so
//! all state transitions happen on the owner's task.

use std::sync::Arc;

use removal_service::{RemovalService, ServiceError};
use shared::ImageAsset;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info};

use crate::{
    controller::WorkflowController,
    error::WorkflowError,
    export::{ExportReceipt, ExportSink},
    gallery::SampleGallery,
    intake::{self, DropEvent, FileSelection},
    state::{CompletionOutcome, ProcessingRequest, ViewState, WorkflowEvent, WorkflowStateKind},
};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug)]
pub struct Completion {
    pub request: ProcessingRequest,
    pub outcome: Result<ImageAsset, ServiceError>,
}

/// Callers suppress the platform default when told to, whatever `loaded` says.
#[derive(Debug)]
pub struct DropOutcome {
    pub suppress_default: bool,
    pub loaded: Result<(), WorkflowError>,
}

pub struct WorkflowSession {
    controller: WorkflowController,
    service: Arc<dyn RemovalService>,
    exporter: Arc<dyn ExportSink>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
    pending: usize,
    events: broadcast::Sender<WorkflowEvent>,
}

impl WorkflowSession {
    pub fn new(service: Arc<dyn RemovalService>, exporter: Arc<dyn ExportSink>) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            controller: WorkflowController::new(),
            service,
            exporter,
            completions_tx,
            completions_rx,
            pending: 0,
            events,
        }
    }

    pub fn controller(&self) -> &WorkflowController {
        &self.controller
    }

    pub fn kind(&self) -> WorkflowStateKind {
        self.controller.kind()
    }

    pub fn view(&self) -> ViewState {
        self.controller.view()
    }

    /// Collaborator calls whose completion has not been applied yet, including abandoned ones.
    pub fn pending_completions(&self) -> usize {
        self.pending
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.events.subscribe()
    }

    pub fn load_source(&mut self, asset: ImageAsset) {
        self.controller.load_source(asset);
        self.publish();
    }

    pub fn load_file_selection(&mut self, selection: FileSelection) -> Result<(), WorkflowError> {
        let asset = intake::asset_from_file_selection(selection)?;
        self.load_source(asset);
        Ok(())
    }

    pub fn load_drop(&mut self, event: DropEvent) -> DropOutcome {
        let intake = intake::asset_from_drop(event);
        let loaded = intake.asset.map(|asset| self.load_source(asset));
        DropOutcome {
            suppress_default: intake.suppress_default,
            loaded,
        }
    }

    pub fn select_sample(
        &mut self,
        gallery: &SampleGallery,
        sample_id: &str,
    ) -> Result<(), WorkflowError> {
        let asset = gallery.select(sample_id)?;
        self.load_source(asset);
        Ok(())
    }

    pub fn clear_source(&mut self) {
        self.controller.clear_source();
        self.publish();
    }

    /// Transitions to `Processing` and hands the source to the collaborator without
    /// waiting for it. Must be called from within a tokio runtime. A collaborator that
    /// panics is reported as `ServiceError::Unavailable`.
    pub fn request_removal(&mut self) -> Result<ProcessingRequest, WorkflowError> {
        let job = self.controller.request_removal()?;
        self.publish();

        let request = job.request;
        let service = Arc::clone(&self.service);
        let completions = self.completions_tx.clone();
        self.pending += 1;
        info!(request_id = %request.id, source_id = %request.source, "removal requested");
        let call = tokio::spawn(async move { service.remove_background(job.source).await });
        tokio::spawn(async move {
            let outcome = match call.await {
                Ok(outcome) => outcome,
                Err(err) => {
                    error!(request_id = %request.id, "removal task failed: {err}");
                    Err(ServiceError::Unavailable(format!(
                        "removal task ended without an answer: {err}"
                    )))
                }
            };
            if completions.send(Completion { request, outcome }).is_err() {
                debug!(request_id = %request.id, "session dropped before removal completed");
            }
        });

        Ok(request)
    }

    /// Applies a completion through the controller's staleness rules.
    pub fn apply(&mut self, completion: Completion) -> CompletionOutcome {
        let outcome = match completion.outcome {
            Ok(result) => self.controller.removal_succeeded(completion.request, result),
            Err(err) => self.controller.removal_failed(completion.request, err),
        };
        self.publish();
        outcome
    }

    /// Waits for the next collaborator completion and applies it. Returns `None` at once
    /// when nothing is in flight. Cancel safe.
    pub async fn next_completion(&mut self) -> Option<CompletionOutcome> {
        if self.pending == 0 {
            return None;
        }
        let completion = self.completions_rx.recv().await?;
        self.pending -= 1;
        Some(self.apply(completion))
    }

    pub fn apply_ready_completions(&mut self) -> Vec<CompletionOutcome> {
        let mut outcomes = Vec::new();
        while let Ok(completion) = self.completions_rx.try_recv() {
            self.pending = self.pending.saturating_sub(1);
            outcomes.push(self.apply(completion));
        }
        outcomes
    }

    pub fn download(&mut self) -> Result<ExportReceipt, WorkflowError> {
        let receipt = self.controller.download(self.exporter.as_ref());
        self.publish();
        receipt
    }

    fn publish(&mut self) {
        for event in self.controller.take_events() {
            // No subscribers is fine.
            let _ = self.events.send(event);
        }
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
