//! Capture and animation persistence.
//!
//! Two directory trees, one subdirectory per device number: the shared
//! tree receives finished artifacts (stills, composed animations), the
//! image tree stages animation event frames until composition picks
//! them up.

use std::path::PathBuf;

use vps_core::{RelayConfig, VpsError};

/// Filesystem layout for captured artifacts.
#[derive(Debug, Clone)]
pub struct Storage {
    shared: PathBuf,
    images: PathBuf,
}

impl Storage {
    pub fn new(config: &RelayConfig) -> Self {
        Self {
            shared: config.storage.shared_directory.clone(),
            images: config.storage.image_directory.clone(),
        }
    }

    /// Create the per-device directory trees. Must complete before any
    /// capture path runs.
    pub async fn prepare(&self, max_devices: u8) -> Result<(), VpsError> {
        for device in 1..=max_devices {
            tokio::fs::create_dir_all(self.shared_dir(device)).await?;
            tokio::fs::create_dir_all(self.image_dir(device)).await?;
        }
        Ok(())
    }

    pub fn shared_dir(&self, device: u8) -> PathBuf {
        self.shared.join(device.to_string())
    }

    pub fn image_dir(&self, device: u8) -> PathBuf {
        self.images.join(device.to_string())
    }

    /// Persist a captured keyframe under the device's shared directory
    /// and return the filename.
    pub async fn save_capture(&self, device: u8, image: &[u8]) -> Result<String, VpsError> {
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let filename = format!("{device:02}_{stamp}.jpg");
        tokio::fs::write(self.shared_dir(device).join(&filename), image).await?;
        Ok(filename)
    }

    /// Stage one animation event frame, ordered by sequence number.
    pub async fn stage_animation_frame(
        &self,
        device: u8,
        sequence: u32,
        image: &[u8],
    ) -> Result<PathBuf, VpsError> {
        let path = self.image_dir(device).join(format!("{sequence:06}.jpg"));
        tokio::fs::write(&path, image).await?;
        Ok(path)
    }

    /// Remove every staged frame for a device after composition.
    pub async fn clear_staged(&self, device: u8) -> Result<(), VpsError> {
        let dir = self.image_dir(device);
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                tokio::fs::remove_file(entry.path()).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_storage() -> (tempfile::TempDir, Storage) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RelayConfig::default();
        config.storage.shared_directory = dir.path().join("shared");
        config.storage.image_directory = dir.path().join("images");
        let storage = Storage::new(&config);
        (dir, storage)
    }

    #[tokio::test]
    async fn prepare_builds_per_device_trees() {
        let (_dir, storage) = temp_storage();
        storage.prepare(3).await.unwrap();
        for device in 1..=3 {
            assert!(storage.shared_dir(device).is_dir());
            assert!(storage.image_dir(device).is_dir());
        }
    }

    #[tokio::test]
    async fn capture_lands_in_shared_tree() {
        let (_dir, storage) = temp_storage();
        storage.prepare(2).await.unwrap();

        let filename = storage.save_capture(2, b"jpeg-bytes").await.unwrap();
        assert!(filename.starts_with("02_"));
        assert!(filename.ends_with(".jpg"));

        let saved = tokio::fs::read(storage.shared_dir(2).join(&filename))
            .await
            .unwrap();
        assert_eq!(saved, b"jpeg-bytes");
    }

    #[tokio::test]
    async fn staged_frames_are_cleared_after_composition() {
        let (_dir, storage) = temp_storage();
        storage.prepare(1).await.unwrap();

        storage.stage_animation_frame(1, 0, b"f0").await.unwrap();
        storage.stage_animation_frame(1, 1, b"f1").await.unwrap();
        storage.clear_staged(1).await.unwrap();

        let mut entries = tokio::fs::read_dir(storage.image_dir(1)).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }
}
