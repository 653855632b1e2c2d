//! Error types for Cellar.

use crate::page::{FrameId, PageId};
use thiserror::Error;

/// Result type alias using CellarError.
pub type Result<T> = std::result::Result<T, CellarError>;

/// Errors that can occur in Cellar operations.
#[derive(Debug, Error)]
pub enum CellarError {
    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // File errors
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("File already exists: {0}")]
    FileExists(String),

    #[error("File corrupted: {file}, reason: {reason}")]
    FileCorrupted { file: String, reason: String },

    #[error("Invalid page: file {file}, page {page_id}")]
    InvalidPage { file: String, page_id: PageId },

    // Page errors
    #[error("Page full, unable to insert record")]
    PageFull,

    #[error("Record not found: page {page_id}, slot {slot}")]
    RecordNotFound { page_id: PageId, slot: u16 },

    // Buffer pool errors
    #[error("Buffer exceeded, every frame is pinned")]
    BufferExceeded,

    #[error("Page not found in buffer pool: file {file}, page {page_id}")]
    PageNotFound { file: String, page_id: PageId },

    #[error("Page not pinned: file {file}, page {page_id}, {frame_id}")]
    PageNotPinned {
        file: String,
        page_id: PageId,
        frame_id: FrameId,
    },

    #[error("Page pinned: file {file}, page {page_id}, {frame_id}")]
    PagePinned {
        file: String,
        page_id: PageId,
        frame_id: FrameId,
    },

    #[error("Bad buffer: {frame_id}, valid={valid}, dirty={dirty}, referenced={referenced}")]
    BadBuffer {
        frame_id: FrameId,
        valid: bool,
        dirty: bool,
        referenced: bool,
    },

    // Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error as IoError, ErrorKind};

    #[test]
    fn test_io_error_conversion() {
        let io_err = IoError::new(ErrorKind::NotFound, "file not found");
        let err: CellarError = io_err.into();
        assert!(matches!(err, CellarError::Io(_)));
        assert!(err.to_string().contains("I/O error"));
    }

    #[test]
    fn test_invalid_page_display() {
        let err = CellarError::InvalidPage {
            file: "test.1".to_string(),
            page_id: PageId(42),
        };
        assert_eq!(err.to_string(), "Invalid page: file test.1, page 42");
    }

    #[test]
    fn test_buffer_exceeded_display() {
        let err = CellarError::BufferExceeded;
        assert_eq!(err.to_string(), "Buffer exceeded, every frame is pinned");
    }

    #[test]
    fn test_pin_errors_display() {
        let err = CellarError::PageNotPinned {
            file: "test.4".to_string(),
            page_id: PageId(1),
            frame_id: FrameId(3),
        };
        assert_eq!(
            err.to_string(),
            "Page not pinned: file test.4, page 1, frame:3"
        );

        let err = CellarError::PagePinned {
            file: "test.6".to_string(),
            page_id: PageId(2),
            frame_id: FrameId(0),
        };
        assert_eq!(err.to_string(), "Page pinned: file test.6, page 2, frame:0");
    }

    #[test]
    fn test_bad_buffer_display() {
        let err = CellarError::BadBuffer {
            frame_id: FrameId(5),
            valid: false,
            dirty: true,
            referenced: false,
        };
        assert_eq!(
            err.to_string(),
            "Bad buffer: frame:5, valid=false, dirty=true, referenced=false"
        );
    }

    #[test]
    fn test_record_not_found_display() {
        let err = CellarError::RecordNotFound {
            page_id: PageId(9),
            slot: 4,
        };
        assert_eq!(err.to_string(), "Record not found: page 9, slot 4");
    }

    #[test]
    fn test_config_error_display() {
        let err = CellarError::ConfigError("num_frames must be positive".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: num_frames must be positive"
        );
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_ok() -> Result<i32> {
            Ok(42)
        }

        fn returns_err() -> Result<i32> {
            Err(CellarError::Internal("test".to_string()))
        }

        assert!(returns_ok().is_ok());
        assert!(returns_err().is_err());
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CellarError>();
    }
}
