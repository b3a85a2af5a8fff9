//! The GameCube-era memory-card save container (`.gci`/`.vms`): a fixed
//! 0x2088-byte header followed by a shuffled, v2-cipher-encrypted body.

use crate::cipher::{PsoCipher, V2Cipher};
use crate::error::{CoreError, Result};
use crate::prs;

const HEADER_SIZE: usize = 0x2088;
const BANNER_SIZE: usize = 0x1800;
const ICON_SIZE: usize = 0x800;

/// A 256-entry permutation pair derived from a v2 cipher stream, used to
/// scramble/unscramble save data in 0x100-byte blocks.
pub struct ShuffleTables {
    forward_table: [u8; 256],
    reverse_table: [u8; 256],
}

impl ShuffleTables {
    /// Consumes 256 words from `crypt`'s stream building a Fisher-Yates
    /// style permutation.
    pub fn new(crypt: &mut V2Cipher) -> Self {
        let mut forward_table: [u8; 256] = std::array::from_fn(|i| i as u8);
        let mut reverse_table = [0u8; 256];

        let mut r28: i32 = 0xFF;
        let mut r31: usize = 0xFF;
        while r28 >= 0 {
            let r3 = Self::pseudorand(crypt, (r28 + 1) as u32) as usize;
            let t = forward_table[r3];
            forward_table[r3] = forward_table[r31];
            forward_table[r31] = t;

            reverse_table[t as usize] = r28 as u8;
            r31 = r31.wrapping_sub(1);
            r28 -= 1;
        }

        Self {
            forward_table,
            reverse_table,
        }
    }

    fn pseudorand(crypt: &mut V2Cipher, prev: u32) -> u32 {
        (((prev & 0xFFFF) * ((crypt.next_raw() >> 16) & 0xFFFF)) >> 16) & 0xFFFF
    }

    /// Permutes `src` into `dest` (same length), `reverse` selecting which
    /// table to apply. Bytes past the last full 0x100 block are copied
    /// unshuffled, matching the reference.
    pub fn shuffle(&self, dest: &mut [u8], src: &[u8], reverse: bool) {
        assert_eq!(dest.len(), src.len());
        let size = src.len();
        let table = if reverse {
            &self.reverse_table
        } else {
            &self.forward_table
        };

        let full_blocks = size & !0xFF;
        let mut block_offset = 0;
        while block_offset < full_blocks {
            for z in 0..0x100 {
                dest[block_offset + table[z] as usize] = src[block_offset + z];
            }
            block_offset += 0x100;
        }
        dest[full_blocks..].copy_from_slice(&src[full_blocks..]);
    }
}

/// Decrypts a GCI/VMS data section: unshuffle with a table derived from
/// `round1_seed`, then undo the v2 cipher's "minus-t" stream subtraction
/// (also seeded from `round1_seed`, fresh cipher instance).
pub fn decrypt_data_section(data: &[u8], round1_seed: u32, big_endian: bool) -> Result<Vec<u8>> {
    let mut shuf_crypt = V2Cipher::new(round1_seed);
    let tables = ShuffleTables::new(&mut shuf_crypt);

    let mut shuffled = vec![0u8; data.len()];
    tables.shuffle(&mut shuffled, data, true);

    let orig_size = shuffled.len();
    let padded_size = (orig_size + 3) & !3;
    shuffled.resize(padded_size, 0);

    let mut round1_crypt = V2Cipher::with_endianness(round1_seed, big_endian);
    round1_crypt.crypt_minus_t(&mut shuffled)?;

    shuffled.truncate(orig_size);
    Ok(shuffled)
}

/// Inverse of [`decrypt_data_section`].
pub fn encrypt_data_section(data: &[u8], round1_seed: u32, big_endian: bool) -> Result<Vec<u8>> {
    let size = data.len();
    let mut encrypted = data.to_vec();
    let padded_size = (size + 3) & !3;
    encrypted.resize(padded_size, 0);

    let mut crypt = V2Cipher::with_endianness(round1_seed, big_endian);
    crypt.crypt_minus_t(&mut encrypted)?;

    let mut shuf_crypt = V2Cipher::new(round1_seed);
    let tables = ShuffleTables::new(&mut shuf_crypt);

    let mut result = vec![0u8; size];
    tables.shuffle(&mut result, &encrypted[..size], false);
    Ok(result)
}

/// The fixed-size, unencrypted portion of every GCI container: developer
/// and game identifiers, banner/icon bitmaps, and a self-checksum covering
/// everything from `game_name` onward.
#[derive(Debug, Clone)]
pub struct GciFileHeader {
    pub game_id: [u8; 4],
    pub developer_id: [u8; 2],
    pub remaining_gci_header: [u8; 0x3A],
    pub game_name: [u8; 0x1C],
    pub embedded_seed: u32,
    pub file_name: [u8; 0x20],
    pub banner: Vec<u8>,
    pub icon: Vec<u8>,
    pub data_size: u32,
    pub checksum: u32,
}

impl GciFileHeader {
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(CoreError::codec("GCI file is too small for its fixed header"));
        }

        let mut game_id = [0u8; 4];
        game_id.copy_from_slice(&data[0..4]);
        let mut developer_id = [0u8; 2];
        developer_id.copy_from_slice(&data[4..6]);
        let mut remaining_gci_header = [0u8; 0x3A];
        remaining_gci_header.copy_from_slice(&data[6..0x40]);
        let mut game_name = [0u8; 0x1C];
        game_name.copy_from_slice(&data[0x40..0x5C]);
        let embedded_seed = u32::from_be_bytes(data[0x5C..0x60].try_into().unwrap());
        let mut file_name = [0u8; 0x20];
        file_name.copy_from_slice(&data[0x60..0x80]);
        let banner = data[0x80..0x80 + BANNER_SIZE].to_vec();
        let icon_start = 0x80 + BANNER_SIZE;
        let icon = data[icon_start..icon_start + ICON_SIZE].to_vec();
        let data_size = u32::from_be_bytes(data[0x2080..0x2084].try_into().unwrap());
        let checksum = u32::from_be_bytes(data[0x2084..0x2088].try_into().unwrap());

        Ok(Self {
            game_id,
            developer_id,
            remaining_gci_header,
            game_name,
            embedded_seed,
            file_name,
            banner,
            icon,
            data_size,
            checksum,
        })
    }

    /// Recomputes the CRC32 over `game_name..data_size` (with the checksum
    /// field itself treated as zero) and compares against the stored value.
    pub fn checksum_correct(&self) -> bool {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&self.game_name);
        hasher.update(&self.embedded_seed.to_be_bytes());
        hasher.update(&self.file_name);
        hasher.update(&self.banner);
        hasher.update(&self.icon);
        hasher.update(&self.data_size.to_be_bytes());
        hasher.update(&[0u8; 4]);
        hasher.finalize() == self.checksum
    }

    pub fn check(&self) -> Result<()> {
        if !self.checksum_correct() {
            return Err(CoreError::codec("GCI file unencrypted header checksum is incorrect"));
        }
        if &self.developer_id != b"8P" {
            return Err(CoreError::codec("GCI file is not for a Sega game"));
        }
        if self.game_id[0] != b'G' || self.game_id[1] != b'P' {
            return Err(CoreError::codec("GCI file is not for a GameCube Phantasy Star Online title"));
        }
        if self.game_id[2] != b'S' && self.game_id[2] != b'O' {
            return Err(CoreError::codec("GCI file is not for Phantasy Star Online"));
        }
        Ok(())
    }

    pub fn is_ep12(&self) -> bool {
        self.game_id[2] == b'O'
    }

    pub fn is_ep3(&self) -> bool {
        self.game_id[2] == b'S'
    }
}

/// Parses a full `.gci` file, verifying its header and decrypting its
/// body. The system file is not encrypted (`round1_seed = None`); the
/// character and guild-card files are.
pub fn decode_gci(file_bytes: &[u8], round1_seed: Option<u32>) -> Result<(GciFileHeader, Vec<u8>)> {
    let header = GciFileHeader::from_bytes(file_bytes)?;
    header.check()?;

    let body = &file_bytes[HEADER_SIZE..];
    if body.len() < header.data_size as usize {
        return Err(CoreError::codec("GCI file truncated before declared data_size"));
    }
    let body = &body[..header.data_size as usize];

    let decrypted = match round1_seed {
        Some(seed) => decrypt_data_section(body, seed, true)?,
        None => body.to_vec(),
    };
    Ok((header, decrypted))
}

/// Convenience composition for save sections that are additionally
/// PRS-compressed before shuffling/encryption.
pub fn decode_compressed_data_section(data: &[u8], round1_seed: u32, big_endian: bool, max_size: Option<usize>) -> Result<Vec<u8>> {
    let decrypted = decrypt_data_section(data, round1_seed, big_endian)?;
    prs::prs_decompress(&decrypted, max_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shuffle_then_unshuffle_is_identity() {
        let mut crypt = V2Cipher::new(0xABCDEF01);
        let tables = ShuffleTables::new(&mut crypt);

        let data: Vec<u8> = (0..600u32).map(|i| (i % 256) as u8).collect();
        let mut shuffled = vec![0u8; data.len()];
        tables.shuffle(&mut shuffled, &data, false);
        assert_ne!(shuffled, data);

        let mut restored = vec![0u8; data.len()];
        tables.shuffle(&mut restored, &shuffled, true);
        assert_eq!(restored, data);
    }

    #[test]
    fn data_section_roundtrips() {
        let data: Vec<u8> = (0..300u32).map(|i| (i * 7 % 256) as u8).collect();
        let encrypted = encrypt_data_section(&data, 0x1337, true).unwrap();
        let decrypted = decrypt_data_section(&encrypted, 0x1337, true).unwrap();
        assert_eq!(decrypted, data);
    }

    #[test]
    fn header_parse_rejects_short_input() {
        assert!(GciFileHeader::from_bytes(&[0u8; 16]).is_err());
    }
}
