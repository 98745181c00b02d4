use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures::Stream;

use crate::{
	Error, LatencySample, NoopTelemetry, ObjectHeader, Telemetry,
	coding::{Reader, Writer},
	telemetry::now_millis,
	transport::{RecvStream, SendStream, Transport},
};

// The largest chunk returned by a single read.
const MAX_CHUNK: u64 = 64 * 1024;

/// Sends and receives objects, one per unidirectional stream.
///
/// Object boundaries are stream boundaries, so there's no framing beyond the [ObjectHeader].
pub struct Objects<T: Transport> {
	transport: T,
	telemetry: Arc<dyn Telemetry>,
}

impl<T: Transport> Clone for Objects<T> {
	fn clone(&self) -> Self {
		Self {
			transport: self.transport.clone(),
			telemetry: self.telemetry.clone(),
		}
	}
}

impl<T: Transport> Objects<T> {
	pub fn new(transport: T) -> Self {
		Self {
			transport,
			telemetry: Arc::new(NoopTelemetry),
		}
	}

	pub fn with_telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
		self.telemetry = telemetry;
		self
	}

	pub fn transport(&self) -> &T {
		&self.transport
	}

	/// Open a new stream and write the header, returning a sink for the payload.
	///
	/// The send timestamp is stamped if the header doesn't already have one.
	pub async fn send(&self, mut header: ObjectHeader) -> Result<ObjectWriter<T::SendStream>, Error> {
		header.timestamp.get_or_insert_with(now_millis);
		header.validate()?;

		let stream = self.transport.open_uni().await.map_err(Error::transport)?;
		let mut writer = Writer::new(stream);
		writer.set_priority(u8::try_from(header.priority).unwrap_or(u8::MAX));

		if let Err(err) = writer.encode(&header).await {
			writer.abort(&err);
			return Err(err);
		}

		tracing::debug!(track = header.track, group = header.group, object = header.object, "sent object");

		Ok(ObjectWriter {
			remain: header.size,
			header,
			writer,
			telemetry: self.telemetry.clone(),
		})
	}

	/// Accept the next stream and decode its header, or [None] once the session has ended.
	///
	/// A malformed header is fatal to that stream only: it is stopped and the error returned.
	/// The caller may keep calling [Self::recv] afterwards.
	pub async fn recv(&self) -> Result<Option<(ObjectHeader, ObjectReader<T::RecvStream>)>, Error> {
		let Some(stream) = self.transport.accept_uni().await.map_err(Error::transport)? else {
			return Ok(None);
		};

		let mut reader = Reader::new(stream);
		let header: ObjectHeader = match reader.decode().await {
			Ok(header) => header,
			Err(err) => {
				reader.abort(&err);
				return Err(err);
			}
		};

		tracing::debug!(track = header.track, group = header.group, object = header.object, "received object");

		if let Some(sent) = header.timestamp {
			self.telemetry.latency(&LatencySample {
				track: header.track,
				group: header.group,
				object: header.object,
				sent,
				received: now_millis(),
			});
		}

		let reader = ObjectReader {
			remain: header.size,
			header: header.clone(),
			reader,
			telemetry: self.telemetry.clone(),
		};

		Ok(Some((header, reader)))
	}

	/// Like [Self::recv], but skips over streams with malformed headers.
	pub async fn next(&self) -> Result<Option<(ObjectHeader, ObjectReader<T::RecvStream>)>, Error> {
		loop {
			match self.recv().await {
				Err(Error::Protocol(err)) => tracing::warn!(%err, "dropping malformed object stream"),
				res => return res,
			}
		}
	}
}

/// The payload sink for a single object.
///
/// Dropping it without calling [Self::close] resets the stream.
pub struct ObjectWriter<S: SendStream> {
	pub header: ObjectHeader,
	writer: Writer<S>,
	remain: Option<u64>,
	telemetry: Arc<dyn Telemetry>,
}

impl<S: SendStream> ObjectWriter<S> {
	/// Write the next chunk of the payload.
	///
	/// Any failure aborts the stream before being returned.
	pub async fn write(&mut self, mut chunk: Bytes) -> Result<(), Error> {
		let size = chunk.len() as u64;

		if let Some(remain) = self.remain.as_mut() {
			if size > *remain {
				let err = Error::WrongSize;
				self.writer.abort(&err);
				return Err(err);
			}
			*remain -= size;
		}

		if let Err(err) = self.writer.write_all(&mut chunk).await {
			tracing::debug!(%err, group = self.header.group, object = self.header.object, "failed to write object");
			self.writer.abort(&err);
			return Err(err);
		}

		self.telemetry.add_tx_bytes(size);

		Ok(())
	}

	/// Finish the stream, erroring if a sized object is incomplete.
	pub fn close(mut self) -> Result<(), Error> {
		if self.remain.is_some_and(|remain| remain > 0) {
			let err = Error::WrongSize;
			self.writer.abort(&err);
			return Err(err);
		}

		self.writer.finish()
	}

	/// Reset the stream with the given error.
	pub fn abort(mut self, err: &Error) {
		self.writer.abort(err);
	}
}

/// The payload source for a single object, read lazily from the stream.
pub struct ObjectReader<S: RecvStream> {
	pub header: ObjectHeader,
	reader: Reader<S>,
	remain: Option<u64>,
	telemetry: Arc<dyn Telemetry>,
}

impl<S: RecvStream> ObjectReader<S> {
	/// Read the next chunk of the payload, or [None] at the end of the object.
	pub async fn read(&mut self) -> Result<Option<Bytes>, Error> {
		let max = match self.remain {
			Some(0) => return Ok(None),
			Some(remain) => remain.min(MAX_CHUNK),
			None => MAX_CHUNK,
		};

		match self.reader.read(max as usize).await? {
			Some(chunk) => {
				if let Some(remain) = self.remain.as_mut() {
					*remain -= chunk.len() as u64;
				}
				self.telemetry.add_rx_bytes(chunk.len() as u64);
				Ok(Some(chunk))
			}
			// The stream ended before the advertised size.
			None if self.remain.is_some() => Err(Error::WrongSize),
			None => Ok(None),
		}
	}

	/// Read the entire payload into memory.
	pub async fn read_all(&mut self) -> Result<Bytes, Error> {
		let mut buf = BytesMut::new();
		while let Some(chunk) = self.read().await? {
			buf.extend_from_slice(&chunk);
		}
		Ok(buf.freeze())
	}

	/// Convert into a stream of payload chunks, as consumed by a demuxer.
	pub fn into_stream(self) -> impl Stream<Item = Result<Bytes, Error>> + Send {
		futures::stream::try_unfold(self, |mut this| async move {
			let chunk = this.read().await?;
			Ok(chunk.map(|chunk| (chunk, this)))
		})
	}

	/// Tell the sender to stop with the given error.
	pub fn abort(&mut self, err: &Error) {
		self.reader.abort(err);
	}
}
