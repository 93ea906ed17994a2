use std::io;

use removal_service::ServiceError;
use shared::{ErrorCode, ErrorNotice, InvalidImage};
use thiserror::Error;

use crate::state::WorkflowStateKind;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: WorkflowStateKind,
    },
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("failed to export result: {0}")]
    Export(#[from] io::Error),
}

impl WorkflowError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidInput(_) => ErrorCode::InvalidInput,
            Self::InvalidState { .. } => ErrorCode::InvalidState,
            Self::Service(_) => ErrorCode::ServiceError,
            Self::Export(_) => ErrorCode::ExportFailed,
        }
    }

    pub fn notice(&self) -> ErrorNotice {
        ErrorNotice::new(self.code(), self.to_string())
    }
}

impl From<InvalidImage> for WorkflowError {
    fn from(value: InvalidImage) -> Self {
        Self::InvalidInput(value.to_string())
    }
}
