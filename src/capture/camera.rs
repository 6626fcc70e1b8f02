//! Camera devices behind a capability trait.
//!
//! Any device satisfying read semantics is acceptable to the coordinator; the
//! real webcam lives behind the `uvc` feature so the station can be built and
//! bench-tested without a camera stack.

use std::path::{Path, PathBuf};

use image::RgbImage;
use tracing::info;
use walkdir::WalkDir;

use crate::error::QcError;

/// A frame source. Opening a device fails fast; a failed read is a miss the
/// caller may recover from.
pub trait CameraDevice: Send {
    fn read_frame(&mut self) -> Result<RgbImage, QcError>;
}

impl<T: CameraDevice + ?Sized> CameraDevice for Box<T> {
    fn read_frame(&mut self) -> Result<RgbImage, QcError> {
        (**self).read_frame()
    }
}

/// Software device that replays still images from a directory, cycling when
/// it reaches the end. Bench and dry-run source.
pub struct FolderCamera {
    files: Vec<PathBuf>,
    next: usize,
}

impl FolderCamera {
    pub fn open(dir: &Path) -> Result<Self, QcError> {
        let mut files: Vec<PathBuf> = WalkDir::new(dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| {
                matches!(
                    path.extension().and_then(|e| e.to_str()),
                    Some("png") | Some("jpg") | Some("jpeg") | Some("bmp")
                )
            })
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(QcError::Init(format!("No images found in {:?}", dir)));
        }
        info!("Folder camera opened with {} images from {:?}", files.len(), dir);
        Ok(Self { files, next: 0 })
    }
}

impl CameraDevice for FolderCamera {
    fn read_frame(&mut self) -> Result<RgbImage, QcError> {
        let path = &self.files[self.next];
        self.next = (self.next + 1) % self.files.len();
        let img = image::open(path)
            .map_err(|e| QcError::Camera(format!("Failed to read {:?}: {}", path, e)))?;
        Ok(img.to_rgb8())
    }
}

/// Physical webcam via nokhwa. Holds the stream open for the device lifetime.
#[cfg(feature = "uvc")]
pub struct UvcCamera {
    camera: nokhwa::Camera,
}

#[cfg(feature = "uvc")]
impl UvcCamera {
    pub fn open(index: u32) -> Result<Self, QcError> {
        use nokhwa::pixel_format::RgbFormat;
        use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType};

        let requested =
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
        let mut camera = nokhwa::Camera::new(CameraIndex::Index(index), requested)
            .map_err(|e| QcError::Init(format!("Could not open video device {}: {}", index, e)))?;
        camera
            .open_stream()
            .map_err(|e| QcError::Init(format!("Could not start video stream: {}", e)))?;
        info!("Webcam {} initialized successfully", index);
        Ok(Self { camera })
    }
}

#[cfg(feature = "uvc")]
impl CameraDevice for UvcCamera {
    fn read_frame(&mut self) -> Result<RgbImage, QcError> {
        use nokhwa::pixel_format::RgbFormat;

        let buffer = self
            .camera
            .frame()
            .map_err(|e| QcError::Camera(format!("Frame read failed: {}", e)))?;
        buffer
            .decode_image::<RgbFormat>()
            .map_err(|e| QcError::Camera(format!("Frame decode failed: {}", e)))
    }
}

#[cfg(feature = "uvc")]
impl Drop for UvcCamera {
    fn drop(&mut self) {
        let _ = self.camera.stop_stream();
        info!("Webcam released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_folder_camera_rejects_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FolderCamera::open(dir.path()).is_err());
    }

    #[test]
    fn test_folder_camera_cycles_in_sorted_order() {
        let dir = tempfile::tempdir().unwrap();
        RgbImage::from_pixel(4, 4, Rgb([10, 10, 10]))
            .save(dir.path().join("b.png"))
            .unwrap();
        RgbImage::from_pixel(4, 4, Rgb([20, 20, 20]))
            .save(dir.path().join("a.png"))
            .unwrap();

        let mut camera = FolderCamera::open(dir.path()).unwrap();
        assert_eq!(camera.read_frame().unwrap().get_pixel(0, 0).0[0], 20);
        assert_eq!(camera.read_frame().unwrap().get_pixel(0, 0).0[0], 10);
        // Wraps around.
        assert_eq!(camera.read_frame().unwrap().get_pixel(0, 0).0[0], 20);
    }

    #[test]
    fn test_folder_camera_ignores_non_image_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();
        RgbImage::from_pixel(4, 4, Rgb([1, 1, 1]))
            .save(dir.path().join("a.png"))
            .unwrap();

        let mut camera = FolderCamera::open(dir.path()).unwrap();
        camera.read_frame().unwrap();
        // Only the png is in rotation.
        assert_eq!(camera.files.len(), 1);
    }
}
