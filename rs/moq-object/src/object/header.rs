use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::coding::{Decode, DecodeError, Encode, MAX_U53, VarInt, decode_u53};

/// The leading byte of every object stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum ObjectType {
	/// The payload continues until the stream is finished.
	Stream = 0x00,

	/// The payload size is encoded in the header.
	Sized = 0x02,
}

impl Encode for ObjectType {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		u8::from(*self).encode(w)
	}
}

impl Decode for ObjectType {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		let kind = u8::decode(r)?;
		Self::try_from(kind).map_err(|_| DecodeError::InvalidType(kind))
	}
}

/// The header that precedes every object payload.
///
/// `(track, group, object)` uniquely identifies a payload within a session.
/// `expires` and `timestamp` use zero on the wire to mean "absent", so `Some(0)` is not representable for them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ObjectHeader {
	/// The track identifier, up to 2^62.
	pub track: u64,

	/// The group sequence number, up to 2^53.
	pub group: u64,

	/// The object sequence number within the group, up to 2^53.
	pub object: u64,

	/// A scheduling hint; it has no effect on correctness.
	pub priority: u64,

	/// The number of seconds the object may be cached.
	pub expires: Option<u64>,

	/// The size of the payload, otherwise it continues until the end of the stream.
	pub size: Option<u64>,

	/// The send time in milliseconds since the UNIX epoch, only used to measure latency.
	pub timestamp: Option<u64>,
}

impl ObjectHeader {
	pub fn new(track: u64, group: u64, object: u64) -> Self {
		Self {
			track,
			group,
			object,
			..Default::default()
		}
	}

	pub fn kind(&self) -> ObjectType {
		match self.size {
			Some(_) => ObjectType::Sized,
			None => ObjectType::Stream,
		}
	}

	/// Returns an error if any field would not survive encoding.
	pub fn validate(&self) -> Result<(), DecodeError> {
		if VarInt::from_u64(self.track).is_none() {
			return Err(DecodeError::BoundsExceeded);
		}

		for v in [self.group, self.object, self.priority] {
			if v > MAX_U53 {
				return Err(DecodeError::BoundsExceeded);
			}
		}

		for v in [self.expires, self.timestamp].into_iter().flatten() {
			match v {
				0 => return Err(DecodeError::InvalidValue),
				v if v > MAX_U53 => return Err(DecodeError::BoundsExceeded),
				_ => {}
			}
		}

		if self.size.is_some_and(|size| size > MAX_U53) {
			return Err(DecodeError::BoundsExceeded);
		}

		Ok(())
	}
}

impl Encode for ObjectHeader {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		self.kind().encode(w);
		self.track.encode(w);
		self.group.encode(w);
		self.object.encode(w);
		self.priority.encode(w);
		self.expires.unwrap_or(0).encode(w);
		if let Some(size) = self.size {
			size.encode(w);
		}
		self.timestamp.unwrap_or(0).encode(w);
	}
}

impl Decode for ObjectHeader {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		let kind = ObjectType::decode(r)?;
		let track = u64::decode(r)?;
		let group = decode_u53(r)?;
		let object = decode_u53(r)?;
		let priority = decode_u53(r)?;
		let expires = decode_u53(r)?;

		let size = match kind {
			ObjectType::Sized => Some(decode_u53(r)?),
			ObjectType::Stream => None,
		};

		let timestamp = decode_u53(r)?;

		Ok(Self {
			track,
			group,
			object,
			priority,
			expires: (expires > 0).then_some(expires),
			size,
			timestamp: (timestamp > 0).then_some(timestamp),
		})
	}
}
