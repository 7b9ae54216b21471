//! Background persistence of purchase images.
//!
//! Saving is fire-and-forget: [`spawn_save`] detaches a task whose failure is
//! logged and never reaches the request that produced the image.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info_span};

use bestby_core::PurchaseUid;

/// Durable storage for the raw bytes of a recognized image.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Store `bytes` under the purchase they belong to.
    async fn save(&self, purchase: &PurchaseUid, bytes: &[u8]) -> std::io::Result<()>;
}

/// Writes each image to `<dir>/<purchase_uid>`.
#[derive(Debug, Clone)]
pub struct DiskImageStore {
    dir: PathBuf,
}

impl DiskImageStore {
    #[must_use]
    pub const fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

#[async_trait]
impl ImageStore for DiskImageStore {
    async fn save(&self, purchase: &PurchaseUid, bytes: &[u8]) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;

        // Write then rename so readers never see a partial file.
        let target = self.dir.join(purchase.as_str());
        let partial = self.dir.join(format!("{purchase}.partial"));
        tokio::fs::write(&partial, bytes).await?;
        tokio::fs::rename(&partial, &target).await
    }
}

/// Discards every image. Used when no image directory is wanted.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullImageStore;

#[async_trait]
impl ImageStore for NullImageStore {
    async fn save(&self, _purchase: &PurchaseUid, _bytes: &[u8]) -> std::io::Result<()> {
        Ok(())
    }
}

/// Save an image on a detached task.
///
/// The returned handle may be dropped; it exists so tests can wait for the
/// write to finish.
pub fn spawn_save(
    store: Arc<dyn ImageStore>,
    purchase: PurchaseUid,
    bytes: Vec<u8>,
) -> JoinHandle<()> {
    let span = info_span!("save_image", purchase_uid = %purchase, bytes = bytes.len());
    tokio::spawn(
        async move {
            match store.save(&purchase, &bytes).await {
                Ok(()) => debug!("Image saved"),
                Err(e) => error!(error = %e, "Failed to save purchase image"),
            }
        }
        .instrument(span),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disk_store_writes_file_named_after_purchase() {
        let dir = std::env::temp_dir().join(format!("bestby-images-{}", uuid::Uuid::new_v4()));
        let store = DiskImageStore::new(dir.clone());
        let purchase = PurchaseUid::new("p1");

        store.save(&purchase, b"\xff\xd8\xffjpeg").await.unwrap();

        let written = tokio::fs::read(dir.join("p1")).await.unwrap();
        assert_eq!(written, b"\xff\xd8\xffjpeg");
        assert!(!dir.join("p1.partial").exists());

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_spawn_save_swallows_failures() {
        struct Broken;

        #[async_trait]
        impl ImageStore for Broken {
            async fn save(&self, _: &PurchaseUid, _: &[u8]) -> std::io::Result<()> {
                Err(std::io::Error::other("disk full"))
            }
        }

        let handle = spawn_save(Arc::new(Broken), PurchaseUid::new("p"), vec![1, 2, 3]);
        handle.await.unwrap();
    }
}
