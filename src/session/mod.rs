//! Transactional import and export sessions.
//!
//! Each session is a plain value owned by [`crate::es::Es`]; at most one of
//! each exists per service.

pub mod export;
pub mod import;

pub use export::ExportSession;
pub use import::{ImportSession, ImportState};
