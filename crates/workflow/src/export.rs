//! Saving the processed image to local storage.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde::Serialize;
use shared::{AssetId, ImageAsset};
use tracing::info;

pub const EXPORT_FILE_STEM: &str = "background-removed-image";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportReceipt {
    pub asset_id: AssetId,
    pub path: PathBuf,
    pub bytes: usize,
}

pub trait ExportSink: Send + Sync {
    fn save(&self, file_name: &str, bytes: &[u8]) -> io::Result<PathBuf>;
}

pub fn export_file_name(asset: &ImageAsset) -> String {
    format!("{EXPORT_FILE_STEM}.{}", asset.file_extension())
}

pub(crate) fn export(sink: &dyn ExportSink, asset: &ImageAsset) -> io::Result<ExportReceipt> {
    let file_name = export_file_name(asset);
    let path = sink.save(&file_name, asset.bytes())?;
    info!(asset_id = %asset.id(), path = %path.display(), "exported result image");
    Ok(ExportReceipt {
        asset_id: asset.id(),
        path,
        bytes: asset.len(),
    })
}

/// Writes exports into a directory, creating it on first use. An existing file of the
/// same name is overwritten.
#[derive(Debug, Clone)]
pub struct FileSystemExport {
    dir: PathBuf,
}

impl FileSystemExport {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ExportSink for FileSystemExport {
    fn save(&self, file_name: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(file_name);
        fs::write(&path, bytes)?;
        Ok(path)
    }
}
