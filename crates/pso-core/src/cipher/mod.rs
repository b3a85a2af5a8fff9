//! The four stream-cipher families used by the wire protocol.
//!
//! Each concrete cipher type implements [`PsoCipher`]. The four share only
//! their API; their scratch state layouts are not unified, per the
//! reference design ("do not unify their scratch layouts").

mod patch;
mod v2;
mod v3;
mod v4;

pub use patch::PatchCipher;
pub use v2::V2Cipher;
pub use v3::V3Cipher;
pub use v4::{KeyFile, V4Cipher};

use crate::error::{CoreError, Result};

/// Common operations every cipher family exposes.
///
/// `encrypt`/`decrypt` operate in place on a byte slice whose length must
/// be a multiple of [`PsoCipher::block_size`]; a write of exactly zero
/// bytes is always a no-op.
pub trait PsoCipher {
    /// Size in bytes of one cipher unit (4 for v2/v3/patch, 8 for v4).
    fn block_size(&self) -> usize;

    fn encrypt(&mut self, data: &mut [u8]) -> Result<()>;

    /// Symmetric for v2/v3/patch; differs for v4 (opposite subkey order).
    fn decrypt(&mut self, data: &mut [u8]) -> Result<()>;

    /// Advance the stream by `size` bytes without producing output.
    fn skip(&mut self, size: usize) -> Result<()>;
}

fn check_block_size(len: usize, block_size: usize) -> Result<()> {
    if len % block_size != 0 {
        return Err(CoreError::crypto(format!(
            "size {len} is not a multiple of the cipher's block size {block_size}"
        )));
    }
    Ok(())
}
