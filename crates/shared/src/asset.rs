//! Immutable image payloads moved between input channels, the workflow and the removal service.

use std::{fmt, sync::Arc};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::AssetId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidImage {
    #[error("image payload is empty")]
    Empty,
    #[error("payload of {len} bytes is not a recognizable image encoding")]
    UnrecognizedEncoding { len: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssetOrigin {
    FilePicker { file_name: String },
    DragAndDrop { file_name: String },
    Sample { sample_id: String, url: String },
    RemovalService,
}

impl AssetOrigin {
    pub fn label(&self) -> &str {
        match self {
            Self::FilePicker { file_name } | Self::DragAndDrop { file_name } => file_name,
            Self::Sample { sample_id, .. } => sample_id,
            Self::RemovalService => "removal-service",
        }
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ImageAssetRepr", into = "ImageAssetRepr")]
pub struct ImageAsset {
    id: AssetId,
    format: ImageFormat,
    bytes: Arc<[u8]>,
    origin: AssetOrigin,
}

impl ImageAsset {
    /// Validates `bytes` and wraps them in a new asset with a fresh identity.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>, origin: AssetOrigin) -> Result<Self, InvalidImage> {
        let bytes = bytes.into();
        let format = detect_format(&bytes)?;
        Ok(Self {
            id: AssetId::new(),
            format,
            bytes: Arc::from(bytes),
            origin,
        })
    }

    /// Same payload, new identity.
    pub fn reissue(&self) -> Self {
        Self {
            id: AssetId::new(),
            format: self.format,
            bytes: Arc::clone(&self.bytes),
            origin: self.origin.clone(),
        }
    }

    pub fn reissue_with_origin(&self, origin: AssetOrigin) -> Self {
        Self {
            origin,
            ..self.reissue()
        }
    }

    pub fn id(&self) -> AssetId {
        self.id
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn origin(&self) -> &AssetOrigin {
        &self.origin
    }

    pub fn mime_type(&self) -> &'static str {
        self.format.to_mime_type()
    }

    pub fn file_extension(&self) -> &'static str {
        self.format.extensions_str().first().copied().unwrap_or("img")
    }

    /// Data URI suitable for direct display by a rendering layer.
    pub fn display_ref(&self) -> String {
        format!("data:{};base64,{}", self.mime_type(), STANDARD.encode(&self.bytes))
    }
}

impl fmt::Debug for ImageAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageAsset")
            .field("id", &self.id)
            .field("mime_type", &self.mime_type())
            .field("len", &self.bytes.len())
            .field("origin", &self.origin)
            .finish()
    }
}

fn detect_format(bytes: &[u8]) -> Result<ImageFormat, InvalidImage> {
    if bytes.is_empty() {
        return Err(InvalidImage::Empty);
    }
    image::guess_format(bytes).map_err(|_| InvalidImage::UnrecognizedEncoding { len: bytes.len() })
}

#[derive(Serialize, Deserialize)]
struct ImageAssetRepr {
    id: AssetId,
    mime_type: String,
    origin: AssetOrigin,
    bytes_b64: String,
}

impl From<ImageAsset> for ImageAssetRepr {
    fn from(value: ImageAsset) -> Self {
        Self {
            id: value.id,
            mime_type: value.mime_type().to_string(),
            origin: value.origin,
            bytes_b64: STANDARD.encode(&value.bytes),
        }
    }
}

impl TryFrom<ImageAssetRepr> for ImageAsset {
    type Error = String;

    fn try_from(value: ImageAssetRepr) -> Result<Self, Self::Error> {
        let bytes = STANDARD
            .decode(value.bytes_b64)
            .map_err(|e| format!("invalid asset payload encoding: {e}"))?;
        let format = detect_format(&bytes).map_err(|e| e.to_string())?;
        Ok(Self {
            id: value.id,
            format,
            bytes: Arc::from(bytes),
            origin: value.origin,
        })
    }
}
