// Image provisioning: make sure a language image is present before use

use crate::docker::ContainerRuntime;
use crate::error::ExecutionError;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageStatus {
    /// Found locally, no network traffic
    Cached,
    Pulled,
}

/// Ensures images exist locally, pulling on a cache miss.
///
/// A failed pull is reported, never retried: the first execution per
/// language per host simply pays the pull latency.
#[derive(Clone)]
pub struct ImageProvisioner {
    runtime: Arc<dyn ContainerRuntime>,
}

impl ImageProvisioner {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { runtime }
    }

    pub async fn ensure(&self, image: &str) -> Result<ImageStatus, ExecutionError> {
        if self.runtime.image_present(image).await? {
            debug!(image = image, "Image cache hit");
            return Ok(ImageStatus::Cached);
        }

        warn!(image = image, "Image cache miss, pulling now");
        let started = Instant::now();

        match self.runtime.pull_image(image).await {
            Ok(()) => {
                info!(
                    image = image,
                    pull_ms = started.elapsed().as_millis() as u64,
                    "Image pulled successfully"
                );
                Ok(ImageStatus::Pulled)
            }
            Err(e) => {
                error!(image = image, error = %e, "Failed to pull image");
                Err(ExecutionError::ImageUnavailable {
                    image: image.to_string(),
                    source: e,
                })
            }
        }
    }
}
