use std::fmt::Debug;

use crate::{Error, coding::*, transport::SendStream};

/// A wrapper around a [SendStream] that will reset on Drop.
pub struct Writer<S: SendStream> {
	stream: Option<S>,
	buffer: bytes::BytesMut,
}

impl<S: SendStream> Writer<S> {
	/// Create a new writer for the given stream.
	pub fn new(stream: S) -> Self {
		Self {
			stream: Some(stream),
			buffer: Default::default(),
		}
	}

	fn stream(&mut self) -> Result<&mut S, Error> {
		self.stream.as_mut().ok_or(Error::Closed)
	}

	/// Encode the given message to the stream.
	pub async fn encode<T: Encode + Debug>(&mut self, msg: &T) -> Result<(), Error> {
		let mut buffer = std::mem::take(&mut self.buffer);
		buffer.clear();
		msg.encode(&mut buffer);

		tracing::trace!(?msg, size = buffer.len(), "encoded message");

		let res = self.write_all(&mut buffer).await;
		self.buffer = buffer;
		res
	}

	/// Write the entire [bytes::Buf] to the stream.
	///
	/// NOTE: This can avoid performing a copy when using [bytes::Bytes].
	pub async fn write_all<Buf: bytes::Buf + Send>(&mut self, buf: &mut Buf) -> Result<(), Error> {
		let stream = self.stream()?;
		while buf.has_remaining() {
			stream.write_buf(buf).await.map_err(Error::transport)?;
		}
		Ok(())
	}

	/// Mark the stream as finished.
	pub fn finish(&mut self) -> Result<(), Error> {
		// Take the stream so Drop doesn't reset it.
		let mut stream = self.stream.take().ok_or(Error::Closed)?;
		stream.finish().map_err(Error::transport)
	}

	/// Abort the stream with the given error.
	pub fn abort(&mut self, err: &Error) {
		if let Some(mut stream) = self.stream.take() {
			stream.reset(err.to_code());
		}
	}

	/// Set the priority of the stream.
	pub fn set_priority(&mut self, priority: u8) {
		if let Some(stream) = self.stream.as_mut() {
			stream.set_priority(priority);
		}
	}
}

impl<S: SendStream> Drop for Writer<S> {
	fn drop(&mut self) {
		if let Some(mut stream) = self.stream.take() {
			// Unlike the Quinn default, we abort the stream on drop.
			stream.reset(Error::Cancel.to_code());
		}
	}
}
