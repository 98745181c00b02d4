use std::fmt;

use crate::coding::{Decode, DecodeError, Encode};

/// The largest value representable by a 53-bit field.
///
/// Several header fields are restricted to this range so they survive a round trip through a double.
pub const MAX_U53: u64 = (1 << 53) - 1;

/// An integer less than 2^62, encoded with the QUIC variable-length scheme.
///
/// The two most significant bits of the first byte select a 1, 2, 4 or 8 byte encoding.
#[derive(Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VarInt(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("value too large for varint")]
pub struct BoundsExceeded;

impl VarInt {
	/// The largest representable value.
	pub const MAX: Self = Self((1 << 62) - 1);

	pub const fn from_u64(x: u64) -> Option<Self> {
		if x <= Self::MAX.0 { Some(Self(x)) } else { None }
	}

	pub const fn into_inner(self) -> u64 {
		self.0
	}

	/// The number of bytes needed to encode this value.
	pub const fn size(self) -> usize {
		match self.0 {
			0..=0x3f => 1,
			0x40..=0x3fff => 2,
			0x4000..=0x3fff_ffff => 4,
			_ => 8,
		}
	}
}

impl TryFrom<u64> for VarInt {
	type Error = BoundsExceeded;

	fn try_from(x: u64) -> Result<Self, BoundsExceeded> {
		Self::from_u64(x).ok_or(BoundsExceeded)
	}
}

impl From<VarInt> for u64 {
	fn from(x: VarInt) -> Self {
		x.0
	}
}

impl fmt::Display for VarInt {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.fmt(f)
	}
}

impl fmt::Debug for VarInt {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.fmt(f)
	}
}

impl Decode for VarInt {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		if !r.has_remaining() {
			return Err(DecodeError::Short);
		}

		let size = 1usize << (r.chunk()[0] >> 6);
		if r.remaining() < size {
			return Err(DecodeError::Short);
		}

		let x = match size {
			1 => (r.get_u8() & 0x3f) as u64,
			2 => (r.get_u16() & 0x3fff) as u64,
			4 => (r.get_u32() & 0x3fff_ffff) as u64,
			_ => r.get_u64() & 0x3fff_ffff_ffff_ffff,
		};

		Ok(Self(x))
	}
}

impl Encode for VarInt {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		let x = self.0;
		match self.size() {
			1 => w.put_u8(x as u8),
			2 => w.put_u16(0x4000 | x as u16),
			4 => w.put_u32(0x8000_0000 | x as u32),
			_ => w.put_u64(0xc000_0000_0000_0000 | x),
		}
	}
}

impl Decode for u64 {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		VarInt::decode(r).map(u64::from)
	}
}

impl Encode for u64 {
	/// Encode as a varint.
	///
	/// This will panic if the value is 2^62 or larger; callers validate first.
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		VarInt::try_from(*self).expect("u64 too large for varint").encode(w)
	}
}

/// Decode a varint that must also fit within 53 bits.
pub fn decode_u53<R: bytes::Buf>(r: &mut R) -> Result<u64, DecodeError> {
	let v = u64::decode(r)?;
	if v > MAX_U53 {
		return Err(DecodeError::BoundsExceeded);
	}
	Ok(v)
}
