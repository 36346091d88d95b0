//! External image collaborators.
//!
//! Rotation/re-encode and animation composition are performed outside
//! the relay process. These traits are the seams; the provided
//! implementations keep the pipeline wired when no external processor
//! is attached.

use std::path::Path;

use async_trait::async_trait;

use vps_core::{TouchEvent, VpsError};

/// Rotates and re-encodes one image payload.
///
/// A failed transform drops that single frame; the stream continues.
#[async_trait]
pub trait ImageTransform: Send + Sync {
    /// Rotate `image` by `degrees` (+90 or −90) and re-encode it.
    async fn rotate_and_reencode(&self, image: &[u8], degrees: i32) -> Result<Vec<u8>, VpsError>;
}

/// Composes staged event frames into one animation file, returning
/// the produced filename. `events` carries the touch events that
/// triggered each staged frame, in capture order, so the pipeline can
/// overlay click and move markers.
#[async_trait]
pub trait AnimationComposer: Send + Sync {
    async fn compose(
        &self,
        device: u8,
        source_dir: &Path,
        target_dir: &Path,
        events: &[TouchEvent],
    ) -> Result<String, VpsError>;
}

/// Forwards image bytes unrotated. Viewers receive the device's raw
/// encoding together with the already-remapped geometry.
#[derive(Debug, Default)]
pub struct PassthroughTransform;

#[async_trait]
impl ImageTransform for PassthroughTransform {
    async fn rotate_and_reencode(&self, image: &[u8], _degrees: i32) -> Result<Vec<u8>, VpsError> {
        Ok(image.to_vec())
    }
}

/// Names the animation file without producing one. Stands in until an
/// external GIF pipeline is attached.
#[derive(Debug, Default)]
pub struct NullComposer;

#[async_trait]
impl AnimationComposer for NullComposer {
    async fn compose(
        &self,
        device: u8,
        _source_dir: &Path,
        _target_dir: &Path,
        _events: &[TouchEvent],
    ) -> Result<String, VpsError> {
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        Ok(format!("{device:02}_{stamp}.gif"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn passthrough_keeps_bytes() {
        let out = PassthroughTransform
            .rotate_and_reencode(&[1, 2, 3], -90)
            .await
            .unwrap();
        assert_eq!(out, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn null_composer_names_per_device() {
        let name = NullComposer
            .compose(4, Path::new("a"), Path::new("b"), &[])
            .await
            .unwrap();
        assert!(name.starts_with("04_"));
        assert!(name.ends_with(".gif"));
    }
}
