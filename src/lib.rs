//! **eskit** - title import/export engine for the emulated Wii ES module.
//!
//! # Modules
//! | Module | Purpose |
//! |--------|---------|
//! | [`formats::ticket`] | Ticket - signed license carrying a wrapped title key |
//! | [`formats::tmd`]    | TMD - title metadata listing content records |
//! | [`crypto`]          | AES-128-CBC content crypto, content IV rule, SHA-1 |
//! | [`nand`]            | NAND layout, shared content map, uid.sys, content store |
//! | [`session`]         | Import and export transactions |
//! | [`es`]              | The ES service owning keys, store and sessions |
//! | [`ipc`]             | ioctlv command decoding and reply codes |
//! | [`config`]          | NAND root and key file configuration |
//!
//! # Example
//! ```no_run
//! use eskit::config::Config;
//! use eskit::es::Es;
//!
//! # fn main() -> eskit::Result<()> {
//! let mut es = Es::open(&Config::from_env())?;
//! es.add_ticket(std::fs::read("title.tik")?)?;
//! for title_id in es.installed_titles()? {
//!     println!("{title_id:016x}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod crypto;
pub mod error;
pub mod es;
pub mod formats;
pub mod ipc;
pub mod keys;
pub mod nand;
pub mod session;
pub mod utils;

pub use error::{AuthError, Error, ErrorKind, Result};
