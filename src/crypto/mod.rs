//! Cryptographic operations for title content and tickets.
//!
//! All functions are stateless and accept already-loaded key material; key
//! loading is handled by [`crate::keys::KeySet`].
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`content`] | AES-128-CBC content encryption/decryption, content IV rule, SHA-1 digests |
//!
//! ## Key hierarchy (brief)
//!
//! ```text
//! common key (16 bytes)
//!   └── AES-CBC unwrap ticket title key (IV = title id)
//!         └── title key → AES-CBC content (IV = content index)
//!
//! ticket secret (ECDH, device-bound tickets only)
//!   └── AES-CBC unwrap personalised title key (IV = ticket id)
//! ```

pub mod content;

pub use content::{
    Sha1Hash, content_iv, decrypt_cbc, decrypt_cbc_in_place, encrypt_cbc, encrypt_cbc_in_place,
    sha1,
};
