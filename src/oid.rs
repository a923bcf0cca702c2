//! Object Identifier (OID) type.
//!
//! OIDs are stored as `SmallVec<[u32; 16]>`; trap varbind OIDs rarely exceed
//! sixteen arcs, so most never touch the heap.

use crate::error::{DecodeErrorKind, Error, Result};
use smallvec::SmallVec;
use std::fmt;

/// Maximum number of arcs (subidentifiers) allowed in an OID.
///
/// Per RFC 2578 Section 3.5: "there are at most 128 sub-identifiers in a value".
pub const MAX_OID_LEN: usize = 128;

/// Object Identifier.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Oid {
    arcs: SmallVec<[u32; 16]>,
}

impl Oid {
    /// Create an empty OID.
    pub fn empty() -> Self {
        Self {
            arcs: SmallVec::new(),
        }
    }

    /// Create an OID from arc values.
    pub fn new(arcs: impl IntoIterator<Item = u32>) -> Self {
        Self {
            arcs: arcs.into_iter().collect(),
        }
    }

    /// Create an OID from a slice of arcs.
    ///
    /// ```
    /// use snmp_trapd::oid::Oid;
    ///
    /// let oid = Oid::from_slice(&[1, 3, 6, 1, 6, 3, 1, 1, 4, 1, 0]);
    /// assert_eq!(oid.to_string(), "1.3.6.1.6.3.1.1.4.1.0");
    /// ```
    pub fn from_slice(arcs: &[u32]) -> Self {
        Self {
            arcs: SmallVec::from_slice(arcs),
        }
    }

    /// Parse an OID from dotted notation (e.g. "1.3.6.1.6.3.1.1.5.3").
    ///
    /// A single leading dot is accepted, as printed by net-snmp tools.
    pub fn parse(s: &str) -> Result<Self> {
        let body = s.strip_prefix('.').unwrap_or(s);
        if body.is_empty() {
            return Ok(Self::empty());
        }

        let arcs = body
            .split('.')
            .map(|part| part.parse::<u32>())
            .collect::<std::result::Result<SmallVec<[u32; 16]>, _>>()
            .map_err(|_| Error::InvalidOid { input: s.into() })?;

        if arcs.len() > MAX_OID_LEN {
            return Err(Error::InvalidOid { input: s.into() });
        }

        Ok(Self { arcs })
    }

    /// Get the arc values.
    pub fn arcs(&self) -> &[u32] {
        &self.arcs
    }

    /// Number of arcs.
    pub fn len(&self) -> usize {
        self.arcs.len()
    }

    /// Check if the OID has no arcs.
    pub fn is_empty(&self) -> bool {
        self.arcs.is_empty()
    }

    /// Check whether `other` is a prefix of this OID.
    pub fn starts_with(&self, other: &Oid) -> bool {
        self.arcs.starts_with(&other.arcs)
    }

    /// Append one arc, returning a new OID.
    pub fn child(&self, arc: u32) -> Oid {
        let mut arcs = self.arcs.clone();
        arcs.push(arc);
        Self { arcs }
    }

    /// Encode the OID content octets (no tag or length).
    ///
    /// The first two arcs share one subidentifier, `arc1 * 40 + arc2`.
    pub fn to_ber_smallvec(&self) -> SmallVec<[u8; 64]> {
        let mut bytes = SmallVec::new();

        match self.arcs.as_slice() {
            [] => {}
            [first] => encode_subidentifier(&mut bytes, first.saturating_mul(40)),
            [first, second, rest @ ..] => {
                encode_subidentifier(&mut bytes, first.saturating_mul(40).saturating_add(*second));
                for &arc in rest {
                    encode_subidentifier(&mut bytes, arc);
                }
            }
        }

        bytes
    }

    /// Encode the OID content octets into a `Vec`.
    pub fn to_ber(&self) -> Vec<u8> {
        self.to_ber_smallvec().to_vec()
    }

    /// Decode OID content octets.
    ///
    /// Empty content is rejected. At most [`MAX_OID_LEN`] arcs are accepted.
    pub fn from_ber(data: &[u8]) -> Result<Self> {
        Self::from_ber_at(data, 0)
    }

    /// Decode OID content octets, reporting errors relative to `base_offset`.
    pub(crate) fn from_ber_at(data: &[u8], base_offset: usize) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::decode(base_offset, DecodeErrorKind::ZeroLengthOid));
        }

        let mut arcs = SmallVec::new();

        let (first_subid, consumed) = decode_subidentifier(data, base_offset)?;
        match first_subid {
            0..=39 => {
                arcs.push(0);
                arcs.push(first_subid);
            }
            40..=79 => {
                arcs.push(1);
                arcs.push(first_subid - 40);
            }
            _ => {
                arcs.push(2);
                arcs.push(first_subid - 80);
            }
        }

        let mut i = consumed;
        while i < data.len() {
            let (arc, n) = decode_subidentifier(&data[i..], base_offset + i)?;
            arcs.push(arc);
            i += n;

            if arcs.len() > MAX_OID_LEN {
                return Err(Error::decode(
                    base_offset + i,
                    DecodeErrorKind::OidTooLong {
                        count: arcs.len(),
                        max: MAX_OID_LEN,
                    },
                ));
            }
        }

        Ok(Self { arcs })
    }
}

/// Encode a subidentifier in base-128, most significant group first.
#[inline]
fn encode_subidentifier(bytes: &mut SmallVec<[u8; 64]>, value: u32) {
    let groups = (32 - value.leading_zeros()).div_ceil(7).max(1);
    for i in (0..groups).rev() {
        let mut byte = ((value >> (i * 7)) & 0x7F) as u8;
        if i > 0 {
            byte |= 0x80;
        }
        bytes.push(byte);
    }
}

/// Decode a subidentifier, returning (value, bytes_consumed).
fn decode_subidentifier(data: &[u8], base_offset: usize) -> Result<(u32, usize)> {
    let mut value: u32 = 0;

    for (i, &byte) in data.iter().enumerate() {
        if value > (u32::MAX >> 7) {
            return Err(Error::decode(
                base_offset + i,
                DecodeErrorKind::InvalidOidEncoding,
            ));
        }
        value = (value << 7) | u32::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }

    // Continuation bit set on the final content octet
    Err(Error::decode(
        base_offset + data.len(),
        DecodeErrorKind::InvalidOidEncoding,
    ))
}

impl fmt::Debug for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Oid({})", self)
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, arc) in self.arcs.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{}", arc)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for Oid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl<const N: usize> From<[u32; N]> for Oid {
    fn from(arcs: [u32; N]) -> Self {
        Self::new(arcs)
    }
}

impl PartialOrd for Oid {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Oid {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.arcs.cmp(&other.arcs)
    }
}

/// Build an [`Oid`] from literal arcs.
///
/// ```
/// use snmp_trapd::oid;
///
/// let link_down = oid!(1, 3, 6, 1, 6, 3, 1, 1, 5, 3);
/// assert_eq!(link_down.to_string(), "1.3.6.1.6.3.1.1.5.3");
/// ```
#[macro_export]
macro_rules! oid {
    ($($arc:expr),* $(,)?) => {
        $crate::oid::Oid::from_slice(&[$($arc),*])
    };
}
