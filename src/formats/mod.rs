//! Parsers for the signed title formats ES consumes.
//!
//! Both parsers take ownership of the raw bytes and keep them verbatim, since
//! ES persists and re-exports tickets and TMDs exactly as received. Signatures
//! and certificate chains are not checked.
//!
//! | Module     | Format | Description |
//! |------------|--------|-------------|
//! | [`ticket`] | TIK    | License binding a title id to a wrapped title key |
//! | [`tmd`]    | TMD    | Title metadata: title id, versioning and the ordered content records |

pub mod ticket;
pub mod tmd;
