//! Local artifact access.
//!
//! An [`ArtifactSource`] wraps an open file plus the metadata the upload
//! protocol needs up front: total size and content type. Chunk payloads are
//! read on demand by byte range, so only in-flight chunks occupy memory.

use crate::error::{ClientError, ClientResult};
use bytes::Bytes;
use gantry_core::ChunkSpec;
use std::io::SeekFrom;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// A local file queued for upload.
pub struct ArtifactSource {
    file: File,
    size: u64,
    content_type: String,
}

impl ArtifactSource {
    /// Open `path` and capture its size. The content type is inferred from
    /// the file extension; override it with
    /// [`with_content_type`](Self::with_content_type).
    pub async fn open(path: impl AsRef<Path>) -> ClientResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).await?;
        let size = file.metadata().await?.len();
        Ok(Self {
            file,
            size,
            content_type: content_type_for(path).to_string(),
        })
    }

    /// Replace the inferred content type with a caller-supplied one.
    pub fn with_content_type(mut self, content_type: &str) -> Self {
        self.content_type = content_type.to_string();
        self
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Read the payload for one chunk.
    ///
    /// Safe to call for any spec of the artifact in any order, so a resumed
    /// transfer can skip straight to its missing ranges.
    pub async fn read_chunk(&mut self, spec: &ChunkSpec) -> ClientResult<Bytes> {
        let length = usize::try_from(spec.length).map_err(|_| {
            ClientError::InvalidRequest("chunk length exceeds platform limits".to_string())
        })?;
        self.file.seek(SeekFrom::Start(spec.offset)).await?;
        let mut payload = vec![0u8; length];
        self.file.read_exact(&mut payload).await?;
        Ok(Bytes::from(payload))
    }
}

/// Content type for a path, by extension. `application/octet-stream` when
/// the extension is missing or unrecognized.
pub fn content_type_for(path: &Path) -> &'static str {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return "application/octet-stream";
    };
    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mp3" => "audio/mpeg",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::split;
    use std::io::Write;

    #[test]
    fn test_content_type_inference() {
        assert_eq!(content_type_for(Path::new("banner.png")), "image/png");
        assert_eq!(content_type_for(Path::new("spot.MP4")), "video/mp4");
        assert_eq!(content_type_for(Path::new("photo.jpeg")), "image/jpeg");
        assert_eq!(
            content_type_for(Path::new("artifact")),
            "application/octet-stream"
        );
        assert_eq!(
            content_type_for(Path::new("weird.xyz")),
            "application/octet-stream"
        );
    }

    #[tokio::test]
    async fn test_chunks_reassemble_to_the_source_bytes() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        let data: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        tmp.write_all(&data).unwrap();

        let mut source = ArtifactSource::open(tmp.path()).await.unwrap();
        assert_eq!(source.size(), 5000);

        let mut reassembled = Vec::new();
        for spec in split(source.size(), 1024).unwrap() {
            reassembled.extend_from_slice(&source.read_chunk(&spec).await.unwrap());
        }
        assert_eq!(reassembled, data);
    }

    #[tokio::test]
    async fn test_chunks_can_be_read_out_of_order() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        let data: Vec<u8> = (0..3000u32).map(|i| (i % 199) as u8).collect();
        tmp.write_all(&data).unwrap();

        let mut source = ArtifactSource::open(tmp.path()).await.unwrap();
        let specs: Vec<_> = split(source.size(), 1024).unwrap().collect();

        let last = source.read_chunk(&specs[2]).await.unwrap();
        let first = source.read_chunk(&specs[0]).await.unwrap();
        assert_eq!(&last[..], &data[2048..]);
        assert_eq!(&first[..], &data[..1024]);
    }

    #[tokio::test]
    async fn test_empty_file_yields_an_empty_payload() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let mut source = ArtifactSource::open(tmp.path()).await.unwrap();
        assert_eq!(source.size(), 0);

        let spec = split(0, 1).unwrap().next().unwrap();
        let payload = source.read_chunk(&spec).await.unwrap();
        assert!(payload.is_empty());
    }

    #[tokio::test]
    async fn test_content_type_override() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let source = ArtifactSource::open(tmp.path())
            .await
            .unwrap()
            .with_content_type("image/png");
        assert_eq!(source.content_type(), "image/png");
    }
}
