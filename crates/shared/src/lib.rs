pub mod asset;
pub mod domain;
pub mod error;

pub use asset::{AssetOrigin, ImageAsset, InvalidImage};
pub use domain::{AssetId, RequestId};
pub use error::{ErrorCode, ErrorNotice};
