use std::path::Path;
use std::sync::Arc;

use image::ImageFormat;
use sha2::{Digest, Sha256};
use shared::Fingerprint;

/// Encodings accepted at the upload boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Jpeg,
    Png,
}

impl MediaType {
    pub fn from_mime(mime_type: &str) -> Option<Self> {
        match mime_type.trim().to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(MediaType::Jpeg),
            "image/png" => Some(MediaType::Png),
            _ => None,
        }
    }

    pub fn from_extension(file_name: &str) -> Option<Self> {
        let extension = Path::new(file_name).extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "jpg" | "jpeg" => Some(MediaType::Jpeg),
            "png" => Some(MediaType::Png),
            _ => None,
        }
    }

    pub fn from_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Jpeg => Some(MediaType::Jpeg),
            ImageFormat::Png => Some(MediaType::Png),
            _ => None,
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            MediaType::Jpeg => "image/jpeg",
            MediaType::Png => "image/png",
        }
    }
}

/// One uploaded image. The bytes are shared, never copied or mutated after upload.
#[derive(Debug, Clone)]
pub struct ImageSample {
    file_name: String,
    mime_type: String,
    bytes: Arc<[u8]>,
    size: usize,
}

impl ImageSample {
    pub fn new(file_name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        let size = bytes.len();
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            bytes: bytes.into(),
            size,
        }
    }

    /// An upload whose body was discarded for exceeding the size limit.
    /// Only its received length is kept.
    pub fn oversized(file_name: impl Into<String>, mime_type: impl Into<String>, size: usize) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            bytes: Arc::from(Vec::new()),
            size,
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Received length, which may exceed `bytes().len()` for oversized uploads.
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Declared media type. Generic uploads fall back to the file extension.
    pub fn declared_media_type(&self) -> Option<MediaType> {
        match self.mime_type.trim() {
            "" | "application/octet-stream" => MediaType::from_extension(&self.file_name),
            mime => MediaType::from_mime(mime),
        }
    }

    pub fn fingerprint(&self) -> Fingerprint {
        let mut hasher = Sha256::new();
        hasher.update(&self.bytes);
        Fingerprint::from(hex::encode(hasher.finalize()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_type_prefers_mime() {
        let sample = ImageSample::new("scan.png", "image/jpeg", vec![1, 2, 3]);
        assert_eq!(sample.declared_media_type(), Some(MediaType::Jpeg));
    }

    #[test]
    fn generic_mime_falls_back_to_extension() {
        let sample = ImageSample::new("scan.JPEG", "application/octet-stream", vec![]);
        assert_eq!(sample.declared_media_type(), Some(MediaType::Jpeg));
        let sample = ImageSample::new("scan.bmp", "", vec![]);
        assert_eq!(sample.declared_media_type(), None);
    }

    #[test]
    fn unsupported_mime_is_rejected() {
        assert_eq!(MediaType::from_mime("image/webp"), None);
        assert_eq!(MediaType::from_mime("IMAGE/PNG"), Some(MediaType::Png));
    }

    #[test]
    fn fingerprint_is_sha256_hex() {
        let sample = ImageSample::new("a.png", "image/png", b"abc".to_vec());
        assert_eq!(
            sample.fingerprint().as_str(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn oversized_keeps_received_length_only() {
        let sample = ImageSample::oversized("huge.png", "image/png", 10_000);
        assert_eq!(sample.len(), 10_000);
        assert!(!sample.is_empty());
        assert!(sample.bytes().is_empty());
    }
}
