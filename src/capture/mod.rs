//! Batch frame acquisition from the camera device.

mod camera;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Local};
use image::RgbImage;
use tracing::{error, info, warn};

pub use camera::{CameraDevice, FolderCamera};
#[cfg(feature = "uvc")]
pub use camera::UvcCamera;

use crate::error::QcError;

/// A captured raster image. Immutable once captured; owned by the coordinator
/// until handed to the analyzer.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Slot index within the batch.
    pub index: usize,
    pub captured_at: DateTime<Local>,
    /// Where the frame was persisted for operator review and analysis.
    pub path: PathBuf,
    pub image: RgbImage,
}

/// Drives the camera to produce a fixed-size batch of frames with the
/// required inter-shot timing. Holds the device handle for its lifetime; the
/// device is released on drop.
pub struct CaptureCoordinator<C: CameraDevice> {
    device: C,
    output_dir: PathBuf,
    inter_frame_delay: Duration,
}

impl<C: CameraDevice> CaptureCoordinator<C> {
    pub fn new(device: C, output_dir: PathBuf, inter_frame_delay: Duration) -> Self {
        Self { device, output_dir, inter_frame_delay }
    }

    /// Capture up to `count` frames, blocking. A failed read is logged and
    /// its slot skipped, so the batch may come back short; callers must not
    /// assume fixed length. The inter-frame delay between successive reads
    /// lets the physical stage move and settle.
    ///
    /// `cancel` is checked between reads; a cancelled batch returns the
    /// frames captured so far.
    pub fn capture_batch(
        &mut self,
        count: usize,
        cancel: &AtomicBool,
    ) -> Result<Vec<Frame>, QcError> {
        std::fs::create_dir_all(&self.output_dir).map_err(|e| {
            QcError::CaptureBatch(format!(
                "Failed to create capture folder {:?}: {}",
                self.output_dir, e
            ))
        })?;

        let mut frames = Vec::with_capacity(count);
        for index in 0..count {
            if cancel.load(Ordering::SeqCst) {
                warn!("Capture cancelled after {} frames", frames.len());
                break;
            }
            if index > 0 {
                std::thread::sleep(self.inter_frame_delay);
            }

            let image = match self.device.read_frame() {
                Ok(image) => image,
                Err(e) => {
                    error!("Failed to capture image {}: {}", index + 1, e);
                    continue;
                }
            };

            let captured_at = Local::now();
            // Slot suffix keeps filenames unique within one batch; collisions
            // across batches in the same second are last-write-wins.
            let filename = format!(
                "image_{}_{}.png",
                captured_at.format("%Y%m%d_%H%M%S"),
                index + 1
            );
            let path = self.output_dir.join(filename);
            if let Err(e) = image.save(&path) {
                error!("Failed to save image {}: {}", index + 1, e);
                continue;
            }
            info!("Captured and saved image: {:?}", path);
            frames.push(Frame { index, captured_at, path, image });
        }

        Ok(frames)
    }
}
