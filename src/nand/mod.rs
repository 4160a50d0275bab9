//! Emulated NAND content store.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`paths`]       | Deterministic path derivation from title / content ids |
//! | [`content_map`] | Deduplicated shared content pool (`/shared1/content.map`) |
//! | [`uid_sys`]     | Title UID index (`/sys/uid.sys`) |
//! | [`store`]       | Ticket/TMD persistence, content placement, deletion, listing |

pub mod content_map;
pub mod paths;
pub mod store;
pub mod uid_sys;

pub use paths::NandPaths;
pub use store::NandStore;
