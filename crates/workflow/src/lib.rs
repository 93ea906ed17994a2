//! Image workflow: source/result slots, the removal request lifecycle, input channels,
//! sample gallery and export.

pub mod controller;
pub mod error;
pub mod export;
pub mod gallery;
pub mod intake;
pub mod session;
pub mod state;

pub use controller::{InvalidSnapshot, RemovalJob, WorkflowController};
pub use error::WorkflowError;
pub use export::{export_file_name, ExportReceipt, ExportSink, FileSystemExport, EXPORT_FILE_STEM};
pub use gallery::{SampleGallery, SampleImage, SampleSummary};
pub use intake::{asset_from_drop, asset_from_file_selection, DropEvent, DropIntake, FileSelection};
pub use session::{Completion, DropOutcome, WorkflowSession};
pub use state::{
    CompletionOutcome, ProcessingRequest, ViewState, WorkflowEvent, WorkflowState,
    WorkflowStateKind,
};
