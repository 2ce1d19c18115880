//! # Frame Sources
//!
//! A frame source provides a single still frame on demand. Each capture is a single attempt, any
//! retrying is up to the caller.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::path::{Path, PathBuf};

use chrono::Utc;
#[cfg(feature = "cam")]
use comms_if::net::{zmq, MonitoredSocket, MonitoredSocketError, SocketOptions};
use comms_if::eqpt::cam::{CamFrame, CamImage, ImageFormat};
#[cfg(feature = "cam")]
use comms_if::eqpt::cam::{CamRequest, CamResponse};
use log::debug;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Something which can provide a still frame.
pub trait FrameSource: Send {
    fn capture(&mut self) -> Result<CamFrame, CaptureError>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The camera client, requesting frames from the camera server.
#[cfg(feature = "cam")]
pub struct CamClient {
    socket: MonitoredSocket,

    format: ImageFormat,
}

/// Frame source reading a still image from disk, for bench testing without a camera.
pub struct FileFrameSource {
    path: PathBuf,

    format: ImageFormat,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CaptureError {
    #[error("No frame is available: {0}")]
    NoDevice(String),
}

#[cfg(feature = "cam")]
#[derive(Debug, thiserror::Error)]
pub enum CamClientError {
    #[error("Socket error: {0}")]
    SocketError(MonitoredSocketError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

#[cfg(feature = "cam")]
impl CamClient {
    /// Create a new instance of the camera client.
    ///
    /// `timeout_ms` bounds both sending the request and receiving the response.
    pub fn new(
        ctx: &zmq::Context,
        endpoint: &str,
        timeout_ms: i32,
        format: ImageFormat,
    ) -> Result<Self, CamClientError> {
        let socket_options = SocketOptions {
            block_on_first_connect: false,
            connect_timeout: 1000,
            heartbeat_ivl: 500,
            heartbeat_ttl: 1000,
            heartbeat_timeout: 1000,
            linger: 1,
            recv_timeout: timeout_ms,
            send_timeout: timeout_ms,
            req_correlate: true,
            req_relaxed: true,
            ..Default::default()
        };

        let socket = MonitoredSocket::new(ctx, zmq::REQ, socket_options, endpoint)
            .map_err(CamClientError::SocketError)?;

        Ok(Self { socket, format })
    }
}

#[cfg(feature = "cam")]
impl FrameSource for CamClient {
    fn capture(&mut self) -> Result<CamFrame, CaptureError> {
        if !self.socket.connected() {
            return Err(CaptureError::NoDevice(
                "not connected to the camera server".into(),
            ));
        }

        self.socket
            .send_json(&CamRequest {
                format: self.format,
            })
            .map_err(|e| CaptureError::NoDevice(e.to_string()))?;

        // Relaxed REQ sockets allow a new request after an unanswered one, so a lost reply
        // doesn't wedge the client
        match self.socket.recv_json::<CamResponse>() {
            Ok(Some(CamResponse::Frame(frame))) => {
                debug!(
                    "Received {} byte {:?} frame from the camera",
                    frame.data.len(),
                    frame.format
                );
                Ok(frame)
            }
            Ok(Some(CamResponse::NoFrame(reason))) => Err(CaptureError::NoDevice(reason)),
            Ok(None) => Err(CaptureError::NoDevice(
                "the camera server did not respond".into(),
            )),
            Err(e) => Err(CaptureError::NoDevice(e.to_string())),
        }
    }
}

impl FileFrameSource {
    pub fn new<P: AsRef<Path>>(path: P, format: ImageFormat) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            format,
        }
    }
}

impl FrameSource for FileFrameSource {
    fn capture(&mut self) -> Result<CamFrame, CaptureError> {
        let image = image::open(&self.path).map_err(|e| {
            CaptureError::NoDevice(format!("cannot read {:?}: {}", self.path, e))
        })?;

        CamImage {
            timestamp: Utc::now(),
            image,
        }
        .to_cam_frame(self.format)
        .map_err(|e| CaptureError::NoDevice(format!("cannot encode {:?}: {}", self.path, e)))
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use image::{DynamicImage, GenericImageView};

    #[test]
    fn test_file_frame_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bench.png");
        DynamicImage::new_rgb8(16, 8).save(&path).unwrap();

        let mut source = FileFrameSource::new(&path, ImageFormat::Jpeg(90));
        let frame = source.capture().unwrap();
        assert_eq!(frame.format, ImageFormat::Jpeg(90));

        let image = frame.to_cam_image().unwrap();
        assert_eq!(image.image.dimensions(), (16, 8));

        let mut missing = FileFrameSource::new(dir.path().join("missing.png"), ImageFormat::Png);
        assert!(matches!(missing.capture(), Err(CaptureError::NoDevice(_))));
    }
}
