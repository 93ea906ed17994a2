//! Preset sample images. Samples are fetched ahead of time so that selecting one is a
//! plain `load_source`.

use removal_service::SampleFetcher;
use serde::Serialize;
use shared::{AssetOrigin, ImageAsset};
use tracing::{info, warn};

use crate::error::WorkflowError;

const PRESET_SAMPLES: [(&str, &str, &str); 3] = [
    (
        "sample-1",
        "Sample 1",
        "https://images.unsplash.com/photo-1517849845537-4d257902454a?q=80&w=1935&auto=format&fit=crop&ixlib=rb-4.0.3&ixid=M3wxMjA3fDB8MHxwaG90by1wYWdlfHx8fGVufDB8fHx8fA%3D%3D",
    ),
    (
        "sample-2",
        "Sample 2",
        "https://images.unsplash.com/photo-1503023345310-bd7c1de61c7d?q=80&w=1965&auto=format&fit=crop&ixlib=rb-4.0.3&ixid=M3wxMjA3fDB8MHxwaG90by1wYWdlfHx8fGVufDB8fHx8fA%3D%3D",
    ),
    (
        "sample-3",
        "Sample 3",
        "https://images.unsplash.com/photo-1534528741702-a0c49e587007?q=80&w=1964&auto=format&fit=crop&ixlib=rb-4.0.3&ixid=M3wxMjA3fDB8MHxwaG90by1wYWdlfHx8fGVufDB8fHx8fA%3D%3D",
    ),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SampleImage {
    pub id: String,
    pub label: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SampleSummary {
    #[serde(flatten)]
    pub sample: SampleImage,
    pub ready: bool,
}

#[derive(Debug, Clone)]
struct GalleryEntry {
    sample: SampleImage,
    asset: Option<ImageAsset>,
}

#[derive(Debug, Clone)]
pub struct SampleGallery {
    entries: Vec<GalleryEntry>,
}

impl SampleGallery {
    pub fn new(samples: Vec<SampleImage>) -> Self {
        Self {
            entries: samples
                .into_iter()
                .map(|sample| GalleryEntry {
                    sample,
                    asset: None,
                })
                .collect(),
        }
    }

    pub fn preset() -> Self {
        Self::new(
            PRESET_SAMPLES
                .iter()
                .map(|(id, label, url)| SampleImage {
                    id: (*id).to_string(),
                    label: (*label).to_string(),
                    url: (*url).to_string(),
                })
                .collect(),
        )
    }

    pub fn samples(&self) -> Vec<SampleSummary> {
        self.entries
            .iter()
            .map(|entry| SampleSummary {
                sample: entry.sample.clone(),
                ready: entry.asset.is_some(),
            })
            .collect()
    }

    /// Fetches every sample not yet cached. Failures are logged and skipped; returns the
    /// number of samples ready afterwards.
    pub async fn prefetch(&mut self, fetcher: &dyn SampleFetcher) -> usize {
        for entry in self.entries.iter_mut().filter(|entry| entry.asset.is_none()) {
            let bytes = match fetcher.fetch(&entry.sample.url).await {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!(sample_id = %entry.sample.id, "failed to fetch sample: {err}");
                    continue;
                }
            };
            match ImageAsset::from_bytes(bytes, sample_origin(&entry.sample)) {
                Ok(asset) => entry.asset = Some(asset),
                Err(err) => warn!(sample_id = %entry.sample.id, "sample is not an image: {err}"),
            }
        }

        let ready = self.entries.iter().filter(|e| e.asset.is_some()).count();
        info!(ready, total = self.entries.len(), "sample gallery prefetched");
        ready
    }

    pub fn insert_prefetched(&mut self, sample_id: &str, bytes: Vec<u8>) -> Result<(), WorkflowError> {
        let entry = self.entry_mut(sample_id)?;
        let asset = ImageAsset::from_bytes(bytes, sample_origin(&entry.sample))?;
        entry.asset = Some(asset);
        Ok(())
    }

    /// Every selection yields a new asset identity, even for the same sample.
    pub fn select(&self, sample_id: &str) -> Result<ImageAsset, WorkflowError> {
        let entry = self
            .entries
            .iter()
            .find(|entry| entry.sample.id == sample_id)
            .ok_or_else(|| unknown_sample(sample_id))?;
        entry
            .asset
            .as_ref()
            .map(ImageAsset::reissue)
            .ok_or_else(|| WorkflowError::InvalidInput(format!("sample {sample_id} is not loaded yet")))
    }

    fn entry_mut(&mut self, sample_id: &str) -> Result<&mut GalleryEntry, WorkflowError> {
        self.entries
            .iter_mut()
            .find(|entry| entry.sample.id == sample_id)
            .ok_or_else(|| unknown_sample(sample_id))
    }
}

impl Default for SampleGallery {
    fn default() -> Self {
        Self::preset()
    }
}

fn sample_origin(sample: &SampleImage) -> AssetOrigin {
    AssetOrigin::Sample {
        sample_id: sample.id.clone(),
        url: sample.url.clone(),
    }
}

fn unknown_sample(sample_id: &str) -> WorkflowError {
    WorkflowError::InvalidInput(format!("unknown sample {sample_id}"))
}
