//! The transport capability consumed by the object layer.
//!
//! Connection establishment, TLS and congestion control all live below this seam.
//! Anything that implements [web_transport_trait::Session] can be used via [WebTransport].

mod web;

#[cfg(test)]
pub(crate) mod mock;

pub use web::*;

use std::future::Future;

use bytes::{Buf, BufMut, Bytes};

use crate::SendSyncError;

/// A QUIC-like session that supports unidirectional streams and unreliable datagrams.
pub trait Transport: Clone + Send + Sync + 'static {
	type SendStream: SendStream;
	type RecvStream: RecvStream;
	type Error: SendSyncError + 'static;

	/// Open a new outbound unidirectional stream.
	fn open_uni(&self) -> impl Future<Output = Result<Self::SendStream, Self::Error>> + Send;

	/// Accept the next inbound unidirectional stream, or [None] once the session has ended.
	fn accept_uni(&self) -> impl Future<Output = Result<Option<Self::RecvStream>, Self::Error>> + Send;

	/// Send a single unreliable datagram.
	///
	/// There is no acknowledgement; the datagram may be dropped or reordered.
	fn send_datagram(&self, payload: Bytes) -> Result<(), Self::Error>;

	/// Receive the next datagram, or [None] once the session has ended.
	fn recv_datagram(&self) -> impl Future<Output = Result<Option<Bytes>, Self::Error>> + Send;
}

/// The sending half of a unidirectional stream.
pub trait SendStream: Send + 'static {
	type Error: SendSyncError + 'static;

	/// Write some of the buffer to the stream, returning the number of bytes written.
	fn write_buf<B: Buf + Send>(&mut self, buf: &mut B) -> impl Future<Output = Result<usize, Self::Error>> + Send;

	/// A scheduling hint; higher values are sent first.
	fn set_priority(&mut self, priority: u8);

	/// Gracefully terminate the stream.
	fn finish(&mut self) -> Result<(), Self::Error>;

	/// Abruptly terminate the stream with the given error code.
	fn reset(&mut self, code: u32);
}

/// The receiving half of a unidirectional stream.
pub trait RecvStream: Send + 'static {
	type Error: SendSyncError + 'static;

	/// Read into the buffer, returning [None] when the stream has been finished.
	fn read_buf<B: BufMut + Send>(
		&mut self,
		buf: &mut B,
	) -> impl Future<Output = Result<Option<usize>, Self::Error>> + Send;

	/// Read a chunk of at most `max` bytes, returning [None] when the stream has been finished.
	fn read_chunk(&mut self, max: usize) -> impl Future<Output = Result<Option<Bytes>, Self::Error>> + Send;

	/// Tell the peer to stop sending with the given error code.
	fn stop(&mut self, code: u32);
}
