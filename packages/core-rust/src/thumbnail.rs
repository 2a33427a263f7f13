//! Result type of thumbnail extraction.

use bytes::Bytes;

/// Fixed PNG served whenever no thumbnail can be extracted.
pub const PLACEHOLDER_PNG: &[u8] = include_bytes!("../assets/placeholder.png");

/// Content type of [`PLACEHOLDER_PNG`].
pub const PLACEHOLDER_CONTENT_TYPE: &str = "image/png";

/// An image proxied byte-for-byte from a media provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub bytes: Bytes,
    pub content_type: String,
}

impl Image {
    #[must_use]
    pub fn content_length(&self) -> usize {
        self.bytes.len()
    }
}

/// Either an extracted image or the placeholder.
///
/// The placeholder carries no failure detail; callers cannot tell which
/// step of an extraction failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThumbnailResult {
    Image(Image),
    Placeholder,
}

impl ThumbnailResult {
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        matches!(self, ThumbnailResult::Placeholder)
    }

    /// Content type of the bytes returned by [`ThumbnailResult::body`].
    #[must_use]
    pub fn content_type(&self) -> &str {
        match self {
            ThumbnailResult::Image(image) => &image.content_type,
            ThumbnailResult::Placeholder => PLACEHOLDER_CONTENT_TYPE,
        }
    }

    #[must_use]
    pub fn content_length(&self) -> usize {
        match self {
            ThumbnailResult::Image(image) => image.content_length(),
            ThumbnailResult::Placeholder => PLACEHOLDER_PNG.len(),
        }
    }

    /// Bytes to send to the client.
    #[must_use]
    pub fn body(&self) -> Bytes {
        match self {
            ThumbnailResult::Image(image) => image.bytes.clone(),
            ThumbnailResult::Placeholder => Bytes::from_static(PLACEHOLDER_PNG),
        }
    }
}
