use std::{cmp, fmt::Debug, io};

use bytes::{Buf, Bytes, BytesMut};

use crate::{Error, coding::*, transport::RecvStream};

/// A reader for decoding messages from a stream.
pub struct Reader<S: RecvStream> {
	stream: S,
	buffer: BytesMut,
}

impl<S: RecvStream> Reader<S> {
	pub fn new(stream: S) -> Self {
		Self {
			stream,
			buffer: Default::default(),
		}
	}

	/// Decode the next message from the stream.
	///
	/// Any bytes after the message stay buffered and are returned by [Self::read].
	pub async fn decode<T: Decode + Debug>(&mut self) -> Result<T, Error> {
		loop {
			let mut cursor = io::Cursor::new(&self.buffer);
			match T::decode(&mut cursor) {
				Ok(msg) => {
					self.buffer.advance(cursor.position() as usize);
					return Ok(msg);
				}
				Err(DecodeError::Short) => {
					// Try to read more data
					if self
						.stream
						.read_buf(&mut self.buffer)
						.await
						.map_err(Error::transport)?
						.is_none()
					{
						// Stream closed while we still need more data
						return Err(Error::Protocol(DecodeError::Short));
					}
				}
				Err(e) => return Err(Error::Protocol(e)),
			}
		}
	}

	/// Returns a non-zero chunk of data, or None if the stream is closed
	pub async fn read(&mut self, max: usize) -> Result<Option<Bytes>, Error> {
		if !self.buffer.is_empty() {
			let size = cmp::min(max, self.buffer.len());
			let data = self.buffer.split_to(size).freeze();
			return Ok(Some(data));
		}

		self.stream.read_chunk(max).await.map_err(Error::transport)
	}

	/// Abort the stream with the given error.
	pub fn abort(&mut self, err: &Error) {
		self.stream.stop(err.to_code());
	}
}
