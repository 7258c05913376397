use std::mem::size_of;

use crate::error::{CompileError, ImageError};

/// Signature identifying a compiled image.
pub const MAGIC: usize = 0xDEADF00D;
/// Format version understood by this build.
pub const VERSION: usize = 0;
/// Width of every header field: one platform word.
pub const WORD: usize = size_of::<usize>();
/// Magic, version and payload length.
pub const HEADER_LEN: usize = 3 * WORD;

/// Header-prefixed opcode stream, as written to and read from disk.
///
/// A value of this type always carries a header that matches its payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BinaryImage {
    bytes: Vec<u8>,
}

impl BinaryImage {
    /// Prepend the header to `payload` in an exact-sized allocation.
    pub fn add_info(payload: &[u8]) -> Result<BinaryImage, CompileError> {
        let len = HEADER_LEN + payload.len();
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(len)
            .map_err(|_| CompileError::ImageStorage { len })?;
        for field in [MAGIC, VERSION, payload.len()] {
            bytes.extend_from_slice(&field.to_ne_bytes());
        }
        bytes.extend_from_slice(payload);
        Ok(BinaryImage { bytes })
    }

    /// Validate the header of raw bytes. Nothing past the header is inspected.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<BinaryImage, ImageError> {
        let field = |index: usize| -> Result<usize, ImageError> {
            let start = index * WORD;
            bytes
                .get(start..start + WORD)
                .and_then(|word| word.try_into().ok())
                .map(usize::from_ne_bytes)
                .ok_or(ImageError::Truncated { len: bytes.len() })
        };

        let magic = field(0)?;
        if magic != MAGIC {
            return Err(ImageError::BadMagic { found: magic });
        }
        let version = field(1)?;
        if version != VERSION {
            return Err(ImageError::BadVersion { found: version });
        }
        let declared = field(2)?;
        let actual = bytes.len() - HEADER_LEN;
        if declared != actual {
            return Err(ImageError::LengthMismatch { declared, actual });
        }
        Ok(BinaryImage { bytes })
    }

    /// Whole image, header included.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Opcode stream following the header.
    pub fn payload(&self) -> &[u8] {
        &self.bytes[HEADER_LEN..]
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}
