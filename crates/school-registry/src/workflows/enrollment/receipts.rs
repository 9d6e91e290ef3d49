use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::info;

use super::clock::Clock;
use super::domain::{ReceiptMetadata, ReceiptRef};

pub const DEFAULT_RECEIPT_MAX_BYTES: u64 = 5 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ReceiptError {
    #[error("receipt file is empty")]
    Empty,
    #[error("receipt is {size} bytes; the limit is {max} bytes")]
    TooLarge { size: u64, max: u64 },
    #[error("receipt type '{0}' is not accepted; upload an image or PDF")]
    UnsupportedType(String),
    #[error("receipt storage failed: {0}")]
    Storage(String),
}

/// Size and type limits applied before a receipt is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptPolicy {
    max_bytes: u64,
}

impl ReceiptPolicy {
    pub fn new(max_bytes: u64) -> Self {
        let max_bytes = if max_bytes == 0 {
            DEFAULT_RECEIPT_MAX_BYTES
        } else {
            max_bytes
        };
        Self { max_bytes }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Check size and infer the content type from the suggested file name.
    pub fn validate(&self, bytes: &[u8], suggested_name: &str) -> Result<mime::Mime, ReceiptError> {
        let size = bytes.len() as u64;
        if size == 0 {
            return Err(ReceiptError::Empty);
        }
        if size > self.max_bytes {
            return Err(ReceiptError::TooLarge {
                size,
                max: self.max_bytes,
            });
        }

        let guessed = mime_guess::from_path(suggested_name.trim()).first();
        match guessed {
            Some(mime) if mime.type_() == mime::IMAGE || mime == mime::APPLICATION_PDF => Ok(mime),
            Some(mime) => Err(ReceiptError::UnsupportedType(mime.essence_str().to_string())),
            None => Err(ReceiptError::UnsupportedType(suggested_name.trim().to_string())),
        }
    }
}

impl Default for ReceiptPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RECEIPT_MAX_BYTES)
    }
}

/// Byte storage backing receipt uploads.
pub trait ReceiptStorage: Send + Sync {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), ReceiptError>;
}

/// Writes receipts beneath a local directory.
#[derive(Debug, Clone)]
pub struct LocalDirectoryStorage {
    root: PathBuf,
}

impl LocalDirectoryStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ReceiptStorage for LocalDirectoryStorage {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), ReceiptError> {
        let path = self.root.join(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|err| ReceiptError::Storage(err.to_string()))?;
        }
        std::fs::write(&path, bytes).map_err(|err| ReceiptError::Storage(err.to_string()))
    }
}

/// Validates and stores receipts, producing the metadata attached to requests.
pub struct ReceiptIntake {
    policy: ReceiptPolicy,
    storage: Arc<dyn ReceiptStorage>,
    clock: Arc<dyn Clock>,
    sequence: AtomicU64,
}

impl ReceiptIntake {
    pub fn new(policy: ReceiptPolicy, storage: Arc<dyn ReceiptStorage>, clock: Arc<dyn Clock>) -> Self {
        Self {
            policy,
            storage,
            clock,
            sequence: AtomicU64::new(1),
        }
    }

    pub fn policy(&self) -> &ReceiptPolicy {
        &self.policy
    }

    pub fn store_receipt(
        &self,
        bytes: &[u8],
        suggested_name: &str,
    ) -> Result<ReceiptMetadata, ReceiptError> {
        let content_type = self.policy.validate(bytes, suggested_name)?;
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let key = format!(
            "receipts/{}-{sequence:04}-{}",
            self.clock.now().format("%Y%m%d%H%M%S"),
            sanitize_file_name(suggested_name)
        );

        self.storage.put(&key, bytes)?;
        info!(receipt = %key, size = bytes.len(), "payment receipt stored");

        Ok(ReceiptMetadata {
            reference: ReceiptRef(key),
            original_name: suggested_name.trim().to_string(),
            content_type: content_type.essence_str().to_string(),
            size_bytes: bytes.len() as u64,
        })
    }
}

fn sanitize_file_name(name: &str) -> String {
    let base = name
        .trim()
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches('.').is_empty() {
        "receipt".to_string()
    } else {
        cleaned
    }
}
