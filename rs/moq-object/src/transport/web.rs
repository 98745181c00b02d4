use bytes::{Buf, BufMut, Bytes};

use crate::SendSyncError;

use super::{RecvStream, SendStream, Transport};

/// Adapts any [web_transport_trait::Session] (Quinn, WebSocket polyfill, Iroh) into a [Transport].
#[derive(Clone)]
pub struct WebTransport<S>(pub S);

impl<S> WebTransport<S> {
	pub fn new(session: S) -> Self {
		Self(session)
	}

	pub fn into_inner(self) -> S {
		self.0
	}
}

impl<S> Transport for WebTransport<S>
where
	S: web_transport_trait::Session + Clone + Send + Sync + 'static,
	S::Error: SendSyncError + 'static,
	S::SendStream: Send + 'static,
	S::RecvStream: Send + 'static,
	<S::SendStream as web_transport_trait::SendStream>::Error: SendSyncError + 'static,
	<S::RecvStream as web_transport_trait::RecvStream>::Error: SendSyncError + 'static,
{
	type SendStream = WebSendStream<S::SendStream>;
	type RecvStream = WebRecvStream<S::RecvStream>;
	type Error = S::Error;

	async fn open_uni(&self) -> Result<Self::SendStream, Self::Error> {
		let stream = self.0.open_uni().await?;
		Ok(WebSendStream(stream))
	}

	async fn accept_uni(&self) -> Result<Option<Self::RecvStream>, Self::Error> {
		let stream = self.0.accept_uni().await?;
		Ok(Some(WebRecvStream(stream)))
	}

	fn send_datagram(&self, payload: Bytes) -> Result<(), Self::Error> {
		self.0.send_datagram(payload)
	}

	async fn recv_datagram(&self) -> Result<Option<Bytes>, Self::Error> {
		let datagram = self.0.recv_datagram().await?;
		Ok(Some(datagram))
	}
}

pub struct WebSendStream<S>(S);

impl<S> SendStream for WebSendStream<S>
where
	S: web_transport_trait::SendStream + Send + 'static,
	S::Error: SendSyncError + 'static,
{
	type Error = S::Error;

	async fn write_buf<B: Buf + Send>(&mut self, buf: &mut B) -> Result<usize, Self::Error> {
		self.0.write_buf(buf).await
	}

	fn set_priority(&mut self, priority: u8) {
		self.0.set_priority(priority)
	}

	fn finish(&mut self) -> Result<(), Self::Error> {
		self.0.finish()
	}

	fn reset(&mut self, code: u32) {
		self.0.reset(code)
	}
}

pub struct WebRecvStream<S>(S);

impl<S> RecvStream for WebRecvStream<S>
where
	S: web_transport_trait::RecvStream + Send + 'static,
	S::Error: SendSyncError + 'static,
{
	type Error = S::Error;

	async fn read_buf<B: BufMut + Send>(&mut self, buf: &mut B) -> Result<Option<usize>, Self::Error> {
		self.0.read_buf(buf).await
	}

	async fn read_chunk(&mut self, max: usize) -> Result<Option<Bytes>, Self::Error> {
		self.0.read_chunk(max).await
	}

	fn stop(&mut self, code: u32) {
		self.0.stop(code)
	}
}
