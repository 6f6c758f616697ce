//! Cryptographic primitives for Drivescore
//!
//! This module provides:
//! - Per-scalar authenticated encryption for coordinates at rest
//! - Key material loading and generation

pub mod codec;

// Re-export commonly used items
pub use codec::{EncryptedScalar, FieldCodec, KeyMaterial, KEY_LEN};
