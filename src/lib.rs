//! Terminal-resident librarian for LED-controller presets.
//!
//! Imports preset documents from files or straight from a controller over
//! HTTP, stores each record with curatorial metadata in a local SQLite
//! library, and re-exports selections as device-ready documents. Stored
//! bodies are kept in one canonical textual form so that equality and
//! duplicate detection work on plain substrings.
//!
//! The crate is organized around the interactive loop in `main`:
//!
//! - [`input`] reads raw keystrokes into editable, recallable command lines
//! - [`grammar`] parses a committed line into verb clauses
//! - [`session`] dispatches clauses to handlers over the open [`store`]
//! - [`import`] and [`export`] move documents between the library, local
//!   files, and the [`device`] transport
//! - [`canon`] defines the canonical body form everything else relies on

#![forbid(unsafe_code)]

pub mod canon;
pub mod device;
pub mod error;
pub mod export;
pub mod grammar;
pub mod import;
pub mod input;
pub mod logging;
pub mod prompt;
pub mod session;
pub mod store;

pub use error::{LibrarianError, Result};
