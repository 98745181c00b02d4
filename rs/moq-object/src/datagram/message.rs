use std::str::FromStr;

use bytes::{Buf, BufMut, Bytes};

use crate::coding::{Decode, DecodeError, Encode, MAX_U53, VarInt};

/// One slice of an object's payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fragment {
	pub track: u64,
	pub group: u64,
	pub object: u64,

	/// The 1-based position of this slice within the object.
	pub index: u64,

	pub payload: Bytes,
}

/// A single datagram, using a textual sub-header of space separated fields.
///
/// ```text
/// <track> <group> <object> <index> <len> <payload>
/// <track> <group> <object> <total> end_chunk
/// <track> <group> end
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Datagram {
	Slice(Fragment),

	/// Every slice of the object has been sent, totalling `total` bytes.
	EndChunk {
		track: u64,
		group: u64,
		object: u64,
		total: u64,
	},

	/// Every object in the group has been sent.
	EndGroup { track: u64, group: u64 },
}

impl Datagram {
	pub fn track(&self) -> u64 {
		match self {
			Self::Slice(fragment) => fragment.track,
			Self::EndChunk { track, .. } | Self::EndGroup { track, .. } => *track,
		}
	}

	pub fn group(&self) -> u64 {
		match self {
			Self::Slice(fragment) => fragment.group,
			Self::EndChunk { group, .. } | Self::EndGroup { group, .. } => *group,
		}
	}
}

const END_CHUNK: &[u8] = b"end_chunk";
const END_GROUP: &[u8] = b"end";

impl Encode for Datagram {
	fn encode<W: BufMut>(&self, w: &mut W) {
		match self {
			Self::Slice(fragment) => {
				let header = format!(
					"{} {} {} {} {} ",
					fragment.track,
					fragment.group,
					fragment.object,
					fragment.index,
					fragment.payload.len()
				);
				w.put_slice(header.as_bytes());
				w.put_slice(&fragment.payload);
			}
			Self::EndChunk {
				track,
				group,
				object,
				total,
			} => {
				w.put_slice(format!("{track} {group} {object} {total} ").as_bytes());
				w.put_slice(END_CHUNK);
			}
			Self::EndGroup { track, group } => {
				w.put_slice(format!("{track} {group} ").as_bytes());
				w.put_slice(END_GROUP);
			}
		}
	}
}

impl Decode for Datagram {
	fn decode<R: Buf>(r: &mut R) -> Result<Self, DecodeError> {
		let track = number(&token(r)?, VarInt::MAX.into_inner())?;
		let group = number(&token(r)?, MAX_U53)?;

		let third = token(r)?;
		if third == END_GROUP {
			return finished(r, Self::EndGroup { track, group });
		}

		let object = number(&third, MAX_U53)?;
		let fourth = number(&token(r)?, MAX_U53)?;

		let fifth = token(r)?;
		if fifth == END_CHUNK {
			return finished(
				r,
				Self::EndChunk {
					track,
					group,
					object,
					total: fourth,
				},
			);
		}

		let index = fourth;
		if index == 0 {
			return Err(DecodeError::InvalidValue);
		}

		let size = number(&fifth, MAX_U53)? as usize;
		if r.remaining() < size {
			return Err(DecodeError::Short);
		}

		let payload = r.copy_to_bytes(size);
		let fragment = Fragment {
			track,
			group,
			object,
			index,
			payload,
		};

		finished(r, Self::Slice(fragment))
	}
}

// Read bytes up to the next space, or the end of the buffer.
fn token<R: Buf>(r: &mut R) -> Result<Vec<u8>, DecodeError> {
	if !r.has_remaining() {
		return Err(DecodeError::Short);
	}

	let mut token = Vec::new();
	while r.has_remaining() {
		match r.get_u8() {
			b' ' => break,
			b => token.push(b),
		}
	}

	Ok(token)
}

fn number(token: &[u8], max: u64) -> Result<u64, DecodeError> {
	let invalid = || DecodeError::InvalidNumber(String::from_utf8_lossy(token).into_owned());

	let s = std::str::from_utf8(token).map_err(|_| invalid())?;
	let v = u64::from_str(s).map_err(|_| invalid())?;
	if v > max {
		return Err(DecodeError::BoundsExceeded);
	}

	Ok(v)
}

// A datagram is a single message, so there can't be anything left over.
fn finished<R: Buf>(r: &R, datagram: Datagram) -> Result<Datagram, DecodeError> {
	match r.has_remaining() {
		true => Err(DecodeError::Long),
		false => Ok(datagram),
	}
}
