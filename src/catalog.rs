use std::fs;

use camino::Utf8Path;
use rand::Rng;
use rand::seq::SliceRandom;

use crate::api::VgApi;
use crate::domain::ImageId;
use crate::error::VgError;
use crate::fs_util;

/// Every image id the dataset API knows about.
pub fn all_image_ids(api: &dyn VgApi) -> Result<Vec<ImageId>, VgError> {
    api.fetch_all_image_ids().map_err(|err| match err {
        err @ VgError::SourceUnavailable(_) => err,
        other => VgError::SourceUnavailable(other.to_string()),
    })
}

pub fn load_image_ids(path: &Utf8Path) -> Result<Vec<ImageId>, VgError> {
    let content = fs::read(path.as_std_path())
        .map_err(|err| VgError::Filesystem(format!("read {path}: {err}")))?;
    serde_json::from_slice(&content).map_err(|err| VgError::Decode(format!("{path}: {err}")))
}

pub fn persist_image_ids(path: &Utf8Path, ids: &[ImageId]) -> Result<(), VgError> {
    let content = serde_json::to_vec(ids).map_err(|err| VgError::Decode(err.to_string()))?;
    fs_util::write_bytes_atomic(path, &content)
}

/// Picks `n` distinct ids. Asking for more ids than exist returns all of
/// them, shuffled.
pub fn sample_ids<R: Rng + ?Sized>(all: &[ImageId], n: usize, rng: &mut R) -> Vec<ImageId> {
    all.choose_multiple(rng, n.min(all.len()))
        .copied()
        .collect()
}
