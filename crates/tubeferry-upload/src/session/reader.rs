//! Random-access chunk reads from a sealed staged file.

use std::io::SeekFrom;
use std::path::Path;

use bytes::Bytes;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use tubeferry_core::error::{AppError, ErrorKind};
use tubeferry_core::result::AppResult;
use tubeferry_core::types::ByteRange;

/// Reads byte ranges of a staged file for chunk sends.
///
/// Ranges are read by absolute offset so a resume can jump to whatever
/// the platform acknowledged.
#[derive(Debug)]
pub struct ChunkReader {
    file: File,
    file_size: u64,
}

impl ChunkReader {
    /// Open `path`, checking that it holds exactly `expected_size` bytes.
    pub async fn open(path: &Path, expected_size: u64) -> AppResult<Self> {
        let file = File::open(path).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to open staged file: {}", path.display()),
                e,
            )
        })?;
        let file_size = file.metadata().await?.len();
        if file_size != expected_size {
            return Err(AppError::storage(format!(
                "staged file {} has {file_size} bytes, expected {expected_size}",
                path.display()
            )));
        }
        Ok(Self { file, file_size })
    }

    /// Total file size in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Read exactly `range`.
    pub async fn read(&mut self, range: ByteRange) -> AppResult<Bytes> {
        if range.end > self.file_size || range.is_empty() {
            return Err(AppError::internal(format!(
                "range {range} outside staged file of {} bytes",
                self.file_size
            )));
        }
        self.file.seek(SeekFrom::Start(range.start)).await?;
        let mut buf = vec![0u8; range.len() as usize];
        self.file.read_exact(&mut buf).await?;
        Ok(Bytes::from(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_arbitrary_ranges() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        tokio::fs::write(&path, b"0123456789").await.unwrap();

        let mut reader = ChunkReader::open(&path, 10).await.unwrap();
        assert_eq!(&reader.read(ByteRange::new(6, 4)).await.unwrap()[..], b"6789");
        assert_eq!(&reader.read(ByteRange::new(0, 3)).await.unwrap()[..], b"012");
        assert!(reader.read(ByteRange::new(8, 4)).await.is_err());
    }

    #[tokio::test]
    async fn size_mismatch_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        tokio::fs::write(&path, b"abc").await.unwrap();
        let err = ChunkReader::open(&path, 4).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Storage);
    }
}
