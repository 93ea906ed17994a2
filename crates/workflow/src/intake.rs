//! File-picker and drag-and-drop input channels.

use shared::{AssetOrigin, ImageAsset};
use tracing::debug;

use crate::error::WorkflowError;

/// One file handed over by the platform, with the MIME type it declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSelection {
    pub file_name: String,
    pub declared_mime: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DropEvent {
    pub files: Vec<FileSelection>,
}

#[derive(Debug)]
pub struct DropIntake {
    /// The platform's "navigate to file" default must be suppressed for every drop,
    /// including rejected ones.
    pub suppress_default: bool,
    pub asset: Result<ImageAsset, WorkflowError>,
}

pub fn asset_from_file_selection(selection: FileSelection) -> Result<ImageAsset, WorkflowError> {
    let origin = AssetOrigin::FilePicker {
        file_name: selection.file_name.clone(),
    };
    checked_asset(selection, origin)
}

pub fn asset_from_drop(event: DropEvent) -> DropIntake {
    let dropped = event.files.len();
    let asset = match event.files.into_iter().next() {
        Some(first) => {
            if dropped > 1 {
                debug!(dropped, "multiple files dropped; using the first");
            }
            let origin = AssetOrigin::DragAndDrop {
                file_name: first.file_name.clone(),
            };
            checked_asset(first, origin)
        }
        None => Err(WorkflowError::InvalidInput(
            "drop event carried no files".to_string(),
        )),
    };

    DropIntake {
        suppress_default: true,
        asset,
    }
}

pub fn is_image_mime(mime: &str) -> bool {
    mime.trim().to_ascii_lowercase().starts_with("image/")
}

fn checked_asset(selection: FileSelection, origin: AssetOrigin) -> Result<ImageAsset, WorkflowError> {
    match selection.declared_mime.as_deref() {
        Some(mime) if is_image_mime(mime) => {}
        Some(mime) => {
            return Err(WorkflowError::InvalidInput(format!(
                "{} declares type {mime}, expected image/*",
                selection.file_name
            )))
        }
        None => {
            return Err(WorkflowError::InvalidInput(format!(
                "{} does not declare a file type",
                selection.file_name
            )))
        }
    }

    Ok(ImageAsset::from_bytes(selection.bytes, origin)?)
}
