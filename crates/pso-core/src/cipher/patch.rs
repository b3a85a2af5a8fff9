//! The patch-server cipher: structurally identical to v2, kept as a
//! distinct type so a patch session can't be handed to the game dispatch
//! tables (and vice versa).

use super::{PsoCipher, V2Cipher};
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct PatchCipher(V2Cipher);

impl PatchCipher {
    pub fn new(seed: u32) -> Self {
        Self(V2Cipher::new(seed))
    }
}

impl PsoCipher for PatchCipher {
    fn block_size(&self) -> usize {
        self.0.block_size()
    }

    fn encrypt(&mut self, data: &mut [u8]) -> Result<()> {
        self.0.encrypt(data)
    }

    fn decrypt(&mut self, data: &mut [u8]) -> Result<()> {
        self.0.decrypt(data)
    }

    fn skip(&mut self, size: usize) -> Result<()> {
        self.0.skip(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_like_v2() {
        let mut enc = PatchCipher::new(0xCAFEBABE);
        let mut dec = PatchCipher::new(0xCAFEBABE);
        let mut data = (0u8..=255).collect::<Vec<u8>>();
        let original = data.clone();
        enc.encrypt(&mut data).unwrap();
        assert_ne!(data, original);
        dec.decrypt(&mut data).unwrap();
        assert_eq!(data, original);
    }
}
