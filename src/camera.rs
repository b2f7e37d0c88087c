// Capture-device contract consumed by the detector

use crate::error::CameraError;
use crate::models::Frame;
use async_trait::async_trait;

/// Describes an opened video stream
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamHandle {
    /// Human-readable device name
    pub device: String,
    /// Stream resolution in pixels
    pub width: u32,
    pub height: u32,
}

/// A live video source.
///
/// Implementations own the device; the detector only asks whether a stream is
/// active and pulls the latest frame once per tick.
#[async_trait]
pub trait Camera: Send + Sync {
    /// Opens the stream (idempotent if already open)
    async fn start(&self) -> Result<StreamHandle, CameraError>;

    /// Stops the stream; a no-op when already stopped
    fn stop(&self);

    fn is_active(&self) -> bool;

    /// Most recent frame, or `None` when no frame is available yet
    fn current_frame(&self) -> Option<Frame>;
}
