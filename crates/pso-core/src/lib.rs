//! Session-layer core for a private game-server emulator: wire ciphers,
//! framing, command dispatch, save/archive codecs, and the download
//! session that harvests a remote server's quest catalogue.
//!
//! This crate is deliberately narrow: it has no notion of a lobby/game
//! object model, a database, or a network listener loop. Those live in
//! binaries built on top of it (see `pso-download`).

pub mod archive;
pub mod cipher;
pub mod dispatch;
pub mod download;
pub mod error;
pub mod family;
pub mod framing;
pub mod prs;
pub mod save;

pub use error::{CoreError, Result};
pub use family::{ClientFamily, HeaderKind, LanguageCode};
