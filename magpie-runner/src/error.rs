use thiserror::Error;

/// Frame could not be acquired this cycle
#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error("camera request failed {0}")]
    Http(#[from] reqwest::Error),
    #[error("camera answered with status {0}")]
    Status(reqwest::StatusCode),
    #[error("camera image could not be decoded {0}")]
    Decode(#[from] image::ImageError),
}
