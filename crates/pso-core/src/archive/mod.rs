//! Read-only archive formats carried alongside the session protocol: AFS
//! (map/quest blobs), QST (recorded quest download commands), and text
//! archives (localized string tables).

pub mod afs;
pub mod qst;
pub mod text;

pub use afs::AfsArchive;
pub use qst::decode_qst;
pub use text::{decrypt_pr2, parse_collections, parse_keyboard};
