//! The V4 ("BB"/Blue Burst) stream cipher: a six-round Feistel network
//! keyed by a 1042-word key file XORed with a masked 48-byte seed.
//!
//! Unlike the v2/v3 ciphers, encrypt and decrypt are genuinely different
//! operations: they apply the six subkeys in opposite order.

use super::{check_block_size, PsoCipher};
use crate::error::{CoreError, Result};

const STREAM_LENGTH: usize = 1042;
const SUBKEY_COUNT: usize = 18;
const SBOX_WORDS: usize = 1024;

/// The on-disk key file: 18 "subkey/extra" words followed by four
/// 256-entry 32-bit S-boxes (1024 words total).
#[derive(Debug, Clone)]
pub struct KeyFile {
    words: Vec<u32>,
}

impl KeyFile {
    pub fn from_words(initial_keys: [u32; SUBKEY_COUNT], private_keys: Vec<u32>) -> Result<Self> {
        if private_keys.len() != SBOX_WORDS {
            return Err(CoreError::crypto(format!(
                "BB key file S-box region must be {SBOX_WORDS} words, got {}",
                private_keys.len()
            )));
        }
        let mut words = Vec::with_capacity(STREAM_LENGTH);
        words.extend_from_slice(&initial_keys);
        words.extend_from_slice(&private_keys);
        Ok(Self { words })
    }

    /// Parse a key file from its on-disk byte representation: 1042
    /// little-endian `u32` words (4168 bytes).
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() != STREAM_LENGTH * 4 {
            return Err(CoreError::crypto(format!(
                "BB key file must be {} bytes, got {}",
                STREAM_LENGTH * 4,
                data.len()
            )));
        }
        let words = data
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
            .collect();
        Ok(Self { words })
    }
}

/// V4 cipher. Operates on 8-byte units; `encrypt` and `decrypt` are
/// distinct (opposite subkey order).
#[derive(Debug, Clone)]
pub struct V4Cipher {
    stream: Vec<u32>,
}

impl V4Cipher {
    /// `seed` is the 48-byte opaque blob from the server-init command;
    /// its length must be a multiple of 3 (the masking triplet width).
    pub fn new(key: &KeyFile, seed: &[u8]) -> Result<Self> {
        if seed.len() % 3 != 0 {
            return Err(CoreError::crypto("BB seed size must be divisible by 3"));
        }

        let mut masked_seed = Vec::with_capacity(seed.len());
        for chunk in seed.chunks_exact(3) {
            masked_seed.push(chunk[0] ^ 0x19);
            masked_seed.push(chunk[1] ^ 0x16);
            masked_seed.push(chunk[2] ^ 0x18);
        }

        let mut cipher = Self {
            stream: key.words.clone(),
        };
        cipher.postprocess_initial_stream(&masked_seed);
        Ok(cipher)
    }

    /// The shared Feistel round function: two S-box adds, one S-box xor,
    /// one more S-box add, reading from the four 256-entry tables that
    /// occupy `stream[0x12..0x412)`.
    fn f_full(&self, x: u32) -> u32 {
        let a = self.stream[((x >> 24) as usize) + 0x12];
        let b = self.stream[(((x >> 16) & 0xFF) as usize) + 0x112];
        let c = self.stream[(((x >> 8) & 0xFF) as usize) + 0x212];
        let d = self.stream[((x & 0xFF) as usize) + 0x312];
        (a.wrapping_add(b) ^ c).wrapping_add(d)
    }

    fn postprocess_initial_stream(&mut self, seed: &[u8]) {
        let slen = seed.len() as u32;
        let byte_at = |i: u32| -> u32 { seed[(i % slen) as usize] as i8 as i32 as u32 };

        // Phase 1: XOR stream[0..slen/4) with big-endian words assembled
        // cyclically from the masked seed bytes.
        let mut ecx: u32 = 0;
        let mut ebx: u32 = 0;
        while ebx < slen / 4 {
            let mut ebp = byte_at(ecx) << 0x18;
            let edx1 = (ecx + 1) % slen;
            ebp = (ebp | (byte_at(edx1) << 0x10 & 0xFF0000)) & 0xFFFF00FF;
            let edx2 = (ecx + 2) % slen;
            ebp = (ebp | (byte_at(edx2) << 0x08 & 0xFF00)) & 0xFFFFFF00;
            let idx3 = ecx + 3;
            ecx = ecx + 4;
            let edx3 = idx3 % slen;
            ebp |= byte_at(edx3);
            let edx4 = ecx % slen;
            self.stream[ebx as usize] ^= ebp;
            ecx = edx4;
            ebx += 1;
        }

        // Phase 2: warm-up round over stream[0..18), then 0x1000 bytes
        // (four 256-word S-box blocks) generated in 0x400-byte chunks.
        let mut esi: u32 = 0;
        let mut ecx2: u32 = 0;
        let mut edi: u32 = 0;

        while edi < 0x48 {
            self.feistel_round(&mut esi, &mut ecx2, (edi / 4) as usize);
            edi += 8;
        }

        let mut ou: u32 = 0;
        while ou < 0x1000 {
            let mut edi2: u32 = 0x48;
            while edi2 < 0x448 {
                let out_base = (ou / 4) as usize + (edi2 / 4) as usize;
                self.feistel_round(&mut esi, &mut ecx2, out_base);
                edi2 += 8;
            }
            ou += 0x400;
        }
    }

    /// One warm-up/generation round: advances the `esi`/`ecx` accumulators
    /// through the six-stage Feistel network and stores the resulting pair
    /// into `stream[out_base]`/`stream[out_base + 1]`.
    fn feistel_round(&mut self, esi: &mut u32, ecx: &mut u32, out_base: usize) {
        *esi ^= self.stream[0];
        let mut eax = self.f_full(*esi);
        eax ^= self.stream[1];
        *ecx ^= eax;
        let mut ebx = self.f_full(*ecx);

        for x in 0..=5usize {
            ebx ^= self.stream[x * 2 + 2];
            *esi ^= ebx;
            ebx = self.f_full(*esi);
            ebx ^= self.stream[x * 2 + 3];
            *ecx ^= ebx;
            ebx = self.f_full(*ecx);
        }

        ebx ^= self.stream[14];
        *esi ^= ebx;
        let mut eax2 = self.f_full(*esi);
        eax2 ^= self.stream[15];
        eax2 ^= *ecx;
        let mut ecx3 = self.f_full(eax2);
        ecx3 ^= self.stream[16];
        ecx3 ^= *esi;
        let mut esi3 = self.stream[17];
        esi3 ^= eax2;

        self.stream[out_base] = esi3;
        self.stream[out_base + 1] = ecx3;

        *esi = esi3;
        *ecx = ecx3;
    }

    fn crypt_pair(&self, data: &mut [u8], subkeys: [usize; 6]) {
        let w0 = u32::from_le_bytes(data[0..4].try_into().unwrap());
        let w1 = u32::from_le_bytes(data[4..8].try_into().unwrap());

        let mut ebx = w0 ^ self.stream[subkeys[0]];
        let mut ebp = self.f_full(ebx) ^ self.stream[subkeys[1]];
        ebp ^= w1;
        let mut edi = self.f_full(ebp) ^ self.stream[subkeys[2]];
        ebx ^= edi;
        let esi = self.f_full(ebx);
        ebp = ebp ^ esi ^ self.stream[subkeys[3]];
        edi = self.f_full(ebp) ^ self.stream[subkeys[4]];
        ebp ^= self.stream[subkeys[5]];
        ebx ^= edi;

        data[0..4].copy_from_slice(&ebp.to_le_bytes());
        data[4..8].copy_from_slice(&ebx.to_le_bytes());
    }
}

impl PsoCipher for V4Cipher {
    fn block_size(&self) -> usize {
        8
    }

    fn encrypt(&mut self, data: &mut [u8]) -> Result<()> {
        check_block_size(data.len(), 8)?;
        for chunk in data.chunks_exact_mut(8) {
            self.crypt_pair(chunk, [0, 1, 2, 3, 4, 5]);
        }
        Ok(())
    }

    fn decrypt(&mut self, data: &mut [u8]) -> Result<()> {
        check_block_size(data.len(), 8)?;
        for chunk in data.chunks_exact_mut(8) {
            self.crypt_pair(chunk, [5, 4, 3, 2, 1, 0]);
        }
        Ok(())
    }

    fn skip(&mut self, size: usize) -> Result<()> {
        check_block_size(size, 8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key_file() -> KeyFile {
        let initial: [u32; SUBKEY_COUNT] = std::array::from_fn(|i| (i as u32).wrapping_mul(0x01010101));
        let private: Vec<u32> = (0..SBOX_WORDS as u32).map(|i| i.wrapping_mul(2654435761)).collect();
        KeyFile::from_words(initial, private).unwrap()
    }

    #[test]
    fn encrypt_then_decrypt_is_identity() {
        let key = test_key_file();
        let seed = [0x11u8; 48];
        let mut enc = V4Cipher::new(&key, &seed).unwrap();
        let mut dec = V4Cipher::new(&key, &seed).unwrap();

        let mut data: Vec<u8> = (0u8..=255).collect();
        let original = data.clone();
        enc.encrypt(&mut data).unwrap();
        assert_ne!(data, original);
        dec.decrypt(&mut data).unwrap();
        assert_eq!(data, original);
    }

    #[test]
    fn zero_length_is_noop() {
        let key = test_key_file();
        let mut cipher = V4Cipher::new(&key, &[0u8; 48]).unwrap();
        let mut data: [u8; 0] = [];
        cipher.encrypt(&mut data).unwrap();
    }

    #[test]
    fn non_multiple_of_eight_is_error() {
        let key = test_key_file();
        let mut cipher = V4Cipher::new(&key, &[0u8; 48]).unwrap();
        let mut data = [0u8; 9];
        assert!(cipher.encrypt(&mut data).is_err());
    }

    #[test]
    fn seed_size_must_be_multiple_of_three() {
        let key = test_key_file();
        assert!(V4Cipher::new(&key, &[0u8; 47]).is_err());
    }

    #[test]
    fn key_file_from_bytes_rejects_wrong_length() {
        assert!(KeyFile::from_bytes(&[0u8; 10]).is_err());
    }
}
