//! The closed set of client wire-protocol revisions this core understands.

use serde::{Deserialize, Serialize};

/// A client family: determines header layout, cipher family, and charset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClientFamily {
    DcNte,
    Dc112000,
    DcV1,
    DcV2,
    PcNte,
    PcV2,
    GcNte,
    GcV3,
    GcEp3Nte,
    GcEp3,
    XbV3,
    BbV4,
    PatchPc,
    PatchBb,
}

impl ClientFamily {
    /// PC and BB use UTF-16LE text regardless of language code.
    pub fn uses_utf16(self) -> bool {
        matches!(self, Self::PcNte | Self::PcV2 | Self::BbV4)
    }

    /// GC and XB families use the V3 cipher.
    pub fn uses_v3_cipher(self) -> bool {
        matches!(
            self,
            Self::GcNte | Self::GcV3 | Self::GcEp3Nte | Self::GcEp3 | Self::XbV3
        )
    }

    /// Only BB uses the V4 ("Blue Burst") cipher.
    pub fn uses_v4_cipher(self) -> bool {
        matches!(self, Self::BbV4)
    }

    /// Everything not covered by v3/v4 uses the V2 cipher (including both
    /// patch-server variants, which share the V2 cipher's structure).
    pub fn uses_v2_cipher(self) -> bool {
        !self.uses_v3_cipher() && !self.uses_v4_cipher()
    }

    pub fn is_patch_server(self) -> bool {
        matches!(self, Self::PatchPc | Self::PatchBb)
    }

    pub fn is_v1(self) -> bool {
        matches!(self, Self::DcNte | Self::Dc112000 | Self::DcV1)
    }

    pub fn is_v2(self) -> bool {
        matches!(self, Self::DcV2 | Self::PcNte | Self::PcV2)
    }

    pub fn is_v1_or_v2(self) -> bool {
        self.is_v1() || self.is_v2()
    }

    pub fn is_v3(self) -> bool {
        matches!(
            self,
            Self::GcNte | Self::GcV3 | Self::GcEp3Nte | Self::GcEp3 | Self::XbV3
        )
    }

    pub fn is_dc(self) -> bool {
        matches!(self, Self::DcNte | Self::Dc112000 | Self::DcV1 | Self::DcV2)
    }

    /// Header field order/width depends on family: PC uses one layout,
    /// DC/GC/XB another, BB a third.
    pub fn header_kind(self) -> HeaderKind {
        if self.uses_v4_cipher() {
            HeaderKind::Bb
        } else if matches!(self, Self::PcNte | Self::PcV2) {
            HeaderKind::Pc
        } else {
            HeaderKind::DcGcXb
        }
    }

    /// v2/v3 cipher stream words are consumed big-endian on GC/XB (the
    /// big-endian game), little-endian everywhere else. This is a property
    /// of the cipher, not of the header (the header is always
    /// little-endian).
    pub fn cipher_big_endian(self) -> bool {
        matches!(
            self,
            Self::GcNte | Self::GcV3 | Self::GcEp3Nte | Self::GcEp3 | Self::XbV3
        )
    }
}

/// The three distinct framed-header layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderKind {
    /// `{ u16 size, u8 opcode, u8 flag }`, 4 bytes.
    Pc,
    /// `{ u8 opcode, u8 flag, u16 size }`, 4 bytes.
    DcGcXb,
    /// `{ u16 size, u16 opcode, u32 flag }`, 8 bytes, 8-byte-padded body.
    Bb,
}

impl HeaderKind {
    pub const fn header_size(self) -> usize {
        match self {
            HeaderKind::Pc | HeaderKind::DcGcXb => 4,
            HeaderKind::Bb => 8,
        }
    }

    pub const fn block_size(self) -> usize {
        match self {
            HeaderKind::Bb => 8,
            _ => 4,
        }
    }
}

/// 0=Japanese .. 7=Korean. Selects both text lookup and byte-charset
/// decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageCode(pub u8);

impl LanguageCode {
    pub const JAPANESE: Self = Self(0);
    pub const ENGLISH: Self = Self(1);
    pub const GERMAN: Self = Self(2);
    pub const FRENCH: Self = Self(3);
    pub const SPANISH: Self = Self(4);
    pub const SIMPLIFIED_CHINESE: Self = Self(5);
    pub const TRADITIONAL_CHINESE: Self = Self(6);
    pub const KOREAN: Self = Self(7);

    /// Single-character tag used in download-session filenames.
    pub fn char_tag(self) -> char {
        match self.0 {
            0 => 'J',
            1 => 'E',
            2 => 'G',
            3 => 'F',
            4 => 'S',
            5 => 'C',
            6 => 'T',
            7 => 'K',
            _ => '?',
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicates_partition_families() {
        assert!(ClientFamily::GcV3.uses_v3_cipher());
        assert!(ClientFamily::XbV3.uses_v3_cipher());
        assert!(ClientFamily::BbV4.uses_v4_cipher());
        assert!(ClientFamily::DcV2.uses_v2_cipher());
        assert!(ClientFamily::PatchPc.uses_v2_cipher());
        assert!(!ClientFamily::GcV3.uses_v2_cipher());
        assert!(!ClientFamily::BbV4.uses_v3_cipher());
    }

    #[test]
    fn utf16_families() {
        assert!(ClientFamily::PcV2.uses_utf16());
        assert!(ClientFamily::BbV4.uses_utf16());
        assert!(!ClientFamily::GcV3.uses_utf16());
    }

    #[test]
    fn header_kinds() {
        assert_eq!(ClientFamily::PcV2.header_kind(), HeaderKind::Pc);
        assert_eq!(ClientFamily::GcV3.header_kind(), HeaderKind::DcGcXb);
        assert_eq!(ClientFamily::BbV4.header_kind(), HeaderKind::Bb);
        assert_eq!(HeaderKind::Pc.header_size(), 4);
        assert_eq!(HeaderKind::Bb.header_size(), 8);
        assert_eq!(HeaderKind::Bb.block_size(), 8);
    }

    #[test]
    fn language_char_tags() {
        assert_eq!(LanguageCode::ENGLISH.char_tag(), 'E');
        assert_eq!(LanguageCode::JAPANESE.char_tag(), 'J');
    }
}
