use std::fmt;

use serde::{Deserialize, Serialize};
use sha1::{Digest as _, Sha1};

use crate::error::TypeError;

/// Length of a raw digest in bytes.
pub const DIGEST_LEN: usize = 20;

/// Length of the canonical hex form of a digest.
pub const DIGEST_HEX_LEN: usize = 40;

/// Content-addressed key of a stored object.
///
/// A `Digest` is the 160-bit SHA-1 of an object's header and content.
/// Digests compare and sort by their raw bytes, which is also the order
/// pack indices store them in.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Digest([u8; DIGEST_LEN]);

impl Digest {
    /// Hash raw bytes without any object header.
    pub fn of(data: &[u8]) -> Self {
        let mut raw = [0u8; DIGEST_LEN];
        raw.copy_from_slice(&Sha1::digest(data));
        Self(raw)
    }

    /// Hash an object the way loose objects and packs key it:
    /// `"<kind> <len>\0"` followed by the content.
    pub fn for_object(kind: &str, data: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(kind.as_bytes());
        hasher.update(b" ");
        hasher.update(data.len().to_string().as_bytes());
        hasher.update([0u8]);
        hasher.update(data);
        let mut raw = [0u8; DIGEST_LEN];
        raw.copy_from_slice(&hasher.finalize());
        Self(raw)
    }

    /// Wrap an already computed digest.
    pub const fn from_raw(raw: [u8; DIGEST_LEN]) -> Self {
        Self(raw)
    }

    /// Build a digest from a byte slice, which must be exactly 20 bytes long.
    pub fn from_slice(raw: &[u8]) -> Result<Self, TypeError> {
        let arr: [u8; DIGEST_LEN] = raw.try_into().map_err(|_| TypeError::InvalidLength {
            expected: DIGEST_LEN,
            actual: raw.len(),
        })?;
        Ok(Self(arr))
    }

    /// The null digest (all zeros).
    pub const fn null() -> Self {
        Self([0u8; DIGEST_LEN])
    }

    /// Returns `true` if this is the null digest.
    pub fn is_null(&self) -> bool {
        self.0 == [0u8; DIGEST_LEN]
    }

    /// The raw 20 bytes.
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Canonical 40-character lowercase hex form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 7 hex characters, for log output.
    pub fn short_hex(&self) -> String {
        let mut s = self.to_hex();
        s.truncate(7);
        s
    }

    /// Parse the canonical 40-character hex form.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        if s.len() != DIGEST_HEX_LEN {
            return Err(TypeError::InvalidLength {
                expected: DIGEST_HEX_LEN,
                actual: s.len(),
            });
        }
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.short_hex())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<[u8; DIGEST_LEN]> for Digest {
    fn from(raw: [u8; DIGEST_LEN]) -> Self {
        Self(raw)
    }
}

impl From<Digest> for [u8; DIGEST_LEN] {
    fn from(digest: Digest) -> Self {
        digest.0
    }
}

/// A digest prefix, as typed by a user in abbreviated form.
///
/// The raw bytes alone cannot tell `"abc"` from `"abc0"`, so the canonical
/// hex length travels with them. For odd lengths the low nibble of the last
/// byte is unused and always stored as zero.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PartialDigest {
    bytes: Vec<u8>,
    hex_len: usize,
}

impl PartialDigest {
    /// Build a prefix from raw bytes and its canonical hex length.
    ///
    /// `hex_len` must be in `1..=40` and `bytes` must hold exactly
    /// `ceil(hex_len / 2)` bytes.
    pub fn new(bytes: &[u8], hex_len: usize) -> Result<Self, TypeError> {
        if hex_len == 0 || hex_len > DIGEST_HEX_LEN {
            return Err(TypeError::InvalidPrefixLength(hex_len));
        }
        let byte_len = (hex_len + 1) / 2;
        if bytes.len() != byte_len {
            return Err(TypeError::InvalidLength {
                expected: byte_len,
                actual: bytes.len(),
            });
        }
        let mut bytes = bytes.to_vec();
        if hex_len % 2 == 1 {
            bytes[byte_len - 1] &= 0xf0;
        }
        Ok(Self { bytes, hex_len })
    }

    /// Parse an abbreviated hex digest of 1 to 40 characters.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let hex_len = s.len();
        if hex_len == 0 || hex_len > DIGEST_HEX_LEN {
            return Err(TypeError::InvalidPrefixLength(hex_len));
        }
        let bytes = if hex_len % 2 == 1 {
            hex::decode(format!("{s}0"))
        } else {
            hex::decode(s)
        }
        .map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        Self::new(&bytes, hex_len)
    }

    /// Raw prefix bytes; the last byte may carry a single meaningful nibble.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of significant hex characters.
    pub fn hex_len(&self) -> usize {
        self.hex_len
    }

    /// Returns `true` if the prefix pins down all 40 characters.
    pub fn is_complete(&self) -> bool {
        self.hex_len == DIGEST_HEX_LEN
    }

    /// Returns `true` if `digest` starts with this prefix.
    pub fn matches(&self, digest: &Digest) -> bool {
        let full = self.hex_len / 2;
        let raw = digest.as_bytes();
        if raw[..full] != self.bytes[..full] {
            return false;
        }
        if self.hex_len % 2 == 1 {
            return raw[full] & 0xf0 == self.bytes[full];
        }
        true
    }

    /// The smallest digest carrying this prefix, used as the start of a
    /// search over sorted digests.
    pub fn lower_bound(&self) -> Digest {
        let mut raw = [0u8; DIGEST_LEN];
        raw[..self.bytes.len()].copy_from_slice(&self.bytes);
        Digest::from_raw(raw)
    }

    /// Hex form, exactly `hex_len` characters long.
    pub fn to_hex(&self) -> String {
        let mut s = hex::encode(&self.bytes);
        s.truncate(self.hex_len);
        s
    }
}

impl fmt::Debug for PartialDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PartialDigest({})", self.to_hex())
    }
}

impl fmt::Display for PartialDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<Digest> for PartialDigest {
    fn from(digest: Digest) -> Self {
        Self {
            bytes: digest.as_bytes().to_vec(),
            hex_len: DIGEST_HEX_LEN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn of_is_deterministic() {
        assert_eq!(Digest::of(b"hello world"), Digest::of(b"hello world"));
        assert_ne!(Digest::of(b"hello"), Digest::of(b"world"));
    }

    #[test]
    fn empty_blob_matches_git() {
        let id = Digest::for_object("blob", b"");
        assert_eq!(id.to_hex(), "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391");
    }

    #[test]
    fn null_is_all_zeros() {
        let null = Digest::null();
        assert!(null.is_null());
        assert_eq!(null.as_bytes(), &[0u8; 20]);
    }

    #[test]
    fn hex_roundtrip() {
        let id = Digest::of(b"test");
        assert_eq!(Digest::from_hex(&id.to_hex()).unwrap(), id);
        assert_eq!(id.to_string().len(), 40);
        assert_eq!(id.short_hex().len(), 7);
    }

    #[test]
    fn from_hex_rejects_wrong_length() {
        let err = Digest::from_hex("abcd").unwrap_err();
        assert_eq!(
            err,
            TypeError::InvalidLength {
                expected: 40,
                actual: 4
            }
        );
    }

    #[test]
    fn from_hex_rejects_non_hex() {
        let bad = "zz".repeat(20);
        assert!(matches!(
            Digest::from_hex(&bad),
            Err(TypeError::InvalidHex(_))
        ));
    }

    #[test]
    fn from_slice_checks_length() {
        assert!(Digest::from_slice(&[1u8; 20]).is_ok());
        assert!(Digest::from_slice(&[1u8; 19]).is_err());
    }

    #[test]
    fn ordering_follows_raw_bytes() {
        let lo = Digest::from_raw([0; 20]);
        let hi = Digest::from_raw([1; 20]);
        assert!(lo < hi);
    }

    #[test]
    fn serde_roundtrip() {
        let id = Digest::of(b"serde test");
        let json = serde_json::to_string(&id).unwrap();
        let parsed: Digest = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn partial_odd_length_masks_low_nibble() {
        let p = PartialDigest::new(&[0xab, 0xcf], 3).unwrap();
        assert_eq!(p.as_bytes(), &[0xab, 0xc0]);
        assert_eq!(p.to_hex(), "abc");
        assert_eq!(p.hex_len(), 3);
    }

    #[test]
    fn partial_rejects_bad_lengths() {
        assert_eq!(
            PartialDigest::new(&[], 0).unwrap_err(),
            TypeError::InvalidPrefixLength(0)
        );
        assert_eq!(
            PartialDigest::from_hex(&"a".repeat(41)).unwrap_err(),
            TypeError::InvalidPrefixLength(41)
        );
        assert!(matches!(
            PartialDigest::new(&[0xab], 3),
            Err(TypeError::InvalidLength { .. })
        ));
    }

    #[test]
    fn partial_matching_distinguishes_nibbles() {
        let mut raw = [0xaa; 20];
        raw[2] = 0x1f;
        let id = Digest::from_raw(raw);

        assert!(PartialDigest::from_hex("aaaa1").unwrap().matches(&id));
        assert!(!PartialDigest::from_hex("aaaa2").unwrap().matches(&id));
        assert!(PartialDigest::from_hex("aaaa").unwrap().matches(&id));
        assert!(!PartialDigest::from_hex("aaab").unwrap().matches(&id));
    }

    #[test]
    fn lower_bound_pads_with_zeros() {
        let p = PartialDigest::from_hex("abc").unwrap();
        let mut raw = [0u8; 20];
        raw[0] = 0xab;
        raw[1] = 0xc0;
        assert_eq!(p.lower_bound(), Digest::from_raw(raw));
        assert!(p.matches(&p.lower_bound()));
    }

    #[test]
    fn full_partial_is_complete() {
        let id = Digest::of(b"x");
        let p = PartialDigest::from(id);
        assert!(p.is_complete());
        assert!(p.matches(&id));
        assert_eq!(PartialDigest::from_hex(&id.to_hex()).unwrap(), p);
    }

    proptest! {
        #[test]
        fn every_prefix_matches_its_digest(raw in any::<[u8; 20]>(), len in 1usize..=40) {
            let id = Digest::from_raw(raw);
            let hex = id.to_hex();
            let p = PartialDigest::from_hex(&hex[..len]).unwrap();
            prop_assert!(p.matches(&id));
            prop_assert!(p.lower_bound() <= id);
            prop_assert_eq!(p.to_hex(), &hex[..len]);
        }

        #[test]
        fn changed_nibble_breaks_match(raw in any::<[u8; 20]>(), len in 1usize..=40) {
            let id = Digest::from_raw(raw);
            let mut hex = id.to_hex();
            let last = hex.as_bytes()[len - 1];
            let flipped = if last == b'0' { '1' } else { '0' };
            hex.replace_range(len - 1..len, &flipped.to_string());
            let p = PartialDigest::from_hex(&hex[..len]).unwrap();
            prop_assert!(!p.matches(&id));
        }
    }
}
