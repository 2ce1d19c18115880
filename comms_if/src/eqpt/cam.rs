//! # Camera Equipment Communications Module
//!
//! The pick-and-place controller only ever needs a single still frame from a single camera, taken
//! while the arm is stationary at a checkpoint.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use chrono::{serde::ts_milliseconds, DateTime, Utc};
use image::{DynamicImage, ImageResult};
use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Request to be sent by the camera client to the server
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CamRequest {
    /// Format of the image to acquire
    pub format: ImageFormat,
}

/// An individual frame from a camera
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CamFrame {
    /// UTC timestamp at which the frame was acquired
    #[serde(with = "ts_milliseconds")]
    pub timestamp: DateTime<Utc>,

    /// The format of this frame
    pub format: ImageFormat,

    /// The formatted image data
    pub data: Vec<u8>,
}

#[derive(Clone)]
pub struct CamImage {
    /// UTC timestamp at which the frame was acquired
    pub timestamp: DateTime<Utc>,

    /// The image itself
    pub image: DynamicImage,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Response to be sent by the server to the client
#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum CamResponse {
    /// A frame was acquired
    Frame(CamFrame),

    /// The camera could not provide a frame, with the reason given by the server
    NoFrame(String),
}

/// Possible formats for camera images. This is used rather than image::ImageFormat to:
///     1. Restrict the formats that can be sent back and forth
///     2. Allow serialisation as image::ImageFormat does not implement serde.
#[derive(Debug, Serialize, Deserialize, Copy, Clone, PartialEq)]
pub enum ImageFormat {
    /// PNG image
    Png,

    /// JPEG image with a quality value between 1 and 100, where 100 is best.
    Jpeg(u8),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ImageFormat {
    /// MIME type of images in this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg(_) => "image/jpeg",
        }
    }
}

impl CamFrame {
    /// Convert this camera frame into a camera image
    pub fn to_cam_image(&self) -> ImageResult<CamImage> {
        let image = match self.format {
            ImageFormat::Png => {
                image::load_from_memory_with_format(&self.data, image::ImageFormat::Png)?
            }
            ImageFormat::Jpeg(_) => {
                image::load_from_memory_with_format(&self.data, image::ImageFormat::Jpeg)?
            }
        };

        Ok(CamImage {
            timestamp: self.timestamp,
            image,
        })
    }
}

impl CamImage {
    /// Convert this camera image into a camera frame with the given format
    pub fn to_cam_frame(&self, format: ImageFormat) -> ImageResult<CamFrame> {
        let mut data = Vec::<u8>::new();

        let output_format = match format {
            ImageFormat::Png => image::ImageOutputFormat::Png,
            ImageFormat::Jpeg(q) => image::ImageOutputFormat::Jpeg(q),
        };

        self.image.write_to(&mut data, output_format)?;

        Ok(CamFrame {
            timestamp: self.timestamp,
            format,
            data,
        })
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use image::GenericImageView;

    #[test]
    fn test_frame_image_conversion() -> ImageResult<()> {
        let cam_image = CamImage {
            timestamp: Utc::now(),
            image: DynamicImage::new_rgb8(8, 4),
        };

        let frame = cam_image.to_cam_frame(ImageFormat::Png)?;
        assert_eq!(frame.format.mime_type(), "image/png");
        assert!(!frame.data.is_empty());

        let decoded = frame.to_cam_image()?;
        assert_eq!(decoded.image.width(), 8);
        assert_eq!(decoded.image.height(), 4);

        Ok(())
    }

    #[test]
    fn test_response_wire_format() {
        let resp: CamResponse = serde_json::from_str(r#"{"NoFrame": "camera unplugged"}"#).unwrap();
        match resp {
            CamResponse::NoFrame(reason) => assert_eq!(reason, "camera unplugged"),
            r => panic!("Unexpected response {:?}", r),
        }
    }
}
