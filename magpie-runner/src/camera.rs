use crate::error::AcquisitionError;
use async_trait::async_trait;
use image::RgbImage;
use std::time::Duration;

#[async_trait]
pub trait FrameSource: Send {
    async fn fetch(&mut self) -> Result<RgbImage, AcquisitionError>;
}

/// Camera serving a still JPEG on every GET
pub struct HttpCamera {
    client: reqwest::Client,
    url: String,
}

impl HttpCamera {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, AcquisitionError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(HttpCamera {
            client,
            url: url.to_owned(),
        })
    }
}

#[async_trait]
impl FrameSource for HttpCamera {
    async fn fetch(&mut self) -> Result<RgbImage, AcquisitionError> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AcquisitionError::Status(status));
        }
        let body = response.bytes().await?;
        let frame = image::load_from_memory(&body)?.to_rgb8();
        tracing::debug!(
            width = frame.width(),
            height = frame.height(),
            "Frame acquired"
        );
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageOutputFormat, Rgb};
    use mockito::mock;
    use std::io::Cursor;

    fn camera(path: &str) -> HttpCamera {
        let url = format!("{}{}", &mockito::server_url(), path);
        HttpCamera::new(&url, Duration::from_secs(5)).unwrap()
    }

    fn jpeg_frame() -> Vec<u8> {
        let frame = RgbImage::from_pixel(64, 48, Rgb([200, 30, 30]));
        let mut bytes = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(frame)
            .write_to(&mut bytes, ImageOutputFormat::Jpeg(90))
            .unwrap();
        bytes.into_inner()
    }

    #[tokio::test]
    async fn camera_decodes_jpeg() {
        let mock_camera = mock("GET", "/current.jpg")
            .with_status(200)
            .with_header("content-type", "image/jpeg")
            .with_body(jpeg_frame())
            .create();

        let frame = camera("/current.jpg").fetch().await.unwrap();

        assert_eq!(frame.dimensions(), (64, 48));
        mock_camera.assert();
    }

    #[tokio::test]
    async fn camera_rejects_error_status() {
        let mock_camera = mock("GET", "/unavailable.jpg").with_status(503).create();

        let error = camera("/unavailable.jpg").fetch().await.unwrap_err();

        assert!(matches!(error, AcquisitionError::Status(status) if status.as_u16() == 503));
        mock_camera.assert();
    }

    #[tokio::test]
    async fn camera_reports_undecodable_body() {
        let mock_camera = mock("GET", "/garbage.jpg")
            .with_status(200)
            .with_body("definitely not a jpeg")
            .create();

        let error = camera("/garbage.jpg").fetch().await.unwrap_err();

        assert!(matches!(error, AcquisitionError::Decode(_)));
        mock_camera.assert();
    }
}
