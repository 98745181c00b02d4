//! An in-memory transport used by tests.

use std::sync::{Arc, Mutex};

use bytes::{Buf, BufMut, Bytes};
use tokio::sync::{mpsc, watch};

use super::{RecvStream, SendStream, Transport};

#[derive(Debug, Clone, thiserror::Error)]
pub enum MockError {
	#[error("stream reset: {0}")]
	Reset(u32),

	#[error("stream stopped: {0}")]
	Stopped(u32),

	#[error("closed")]
	Closed,
}

struct Inner {
	uni_tx: mpsc::UnboundedSender<MockRecvStream>,
	uni_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<MockRecvStream>>,
	datagram_tx: mpsc::UnboundedSender<Bytes>,
	datagram_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Bytes>>,

	// While set, opening a stream waits.
	hold: watch::Sender<bool>,
}

/// One side of an in-memory session.
#[derive(Clone)]
pub struct MockTransport {
	inner: Arc<Inner>,
}

/// Create two connected sessions.
pub fn pair() -> (MockTransport, MockTransport) {
	let (a_uni_tx, b_uni_rx) = mpsc::unbounded_channel();
	let (b_uni_tx, a_uni_rx) = mpsc::unbounded_channel();
	let (a_datagram_tx, b_datagram_rx) = mpsc::unbounded_channel();
	let (b_datagram_tx, a_datagram_rx) = mpsc::unbounded_channel();

	let a = MockTransport {
		inner: Arc::new(Inner {
			uni_tx: a_uni_tx,
			uni_rx: tokio::sync::Mutex::new(a_uni_rx),
			datagram_tx: a_datagram_tx,
			datagram_rx: tokio::sync::Mutex::new(a_datagram_rx),
			hold: watch::channel(false).0,
		}),
	};

	let b = MockTransport {
		inner: Arc::new(Inner {
			uni_tx: b_uni_tx,
			uni_rx: tokio::sync::Mutex::new(b_uni_rx),
			datagram_tx: b_datagram_tx,
			datagram_rx: tokio::sync::Mutex::new(b_datagram_rx),
			hold: watch::channel(false).0,
		}),
	};

	(a, b)
}

impl MockTransport {
	/// Make [Transport::open_uni] wait until released.
	pub fn hold_streams(&self, hold: bool) {
		self.inner.hold.send_replace(hold);
	}
}

/// Create a connected stream without a session.
pub fn stream() -> (MockSendStream, MockRecvStream) {
	let (tx, rx) = mpsc::unbounded_channel();
	let stopped = Arc::new(Mutex::new(None));

	let send = MockSendStream {
		tx: Some(tx),
		stopped: stopped.clone(),
	};
	let recv = MockRecvStream {
		rx,
		pending: Bytes::new(),
		stopped,
	};

	(send, recv)
}

impl Transport for MockTransport {
	type SendStream = MockSendStream;
	type RecvStream = MockRecvStream;
	type Error = MockError;

	async fn open_uni(&self) -> Result<MockSendStream, MockError> {
		let mut hold = self.inner.hold.subscribe();
		hold.wait_for(|hold| !*hold).await.map_err(|_| MockError::Closed)?;

		let (send, recv) = stream();
		self.inner.uni_tx.send(recv).map_err(|_| MockError::Closed)?;
		Ok(send)
	}

	async fn accept_uni(&self) -> Result<Option<MockRecvStream>, MockError> {
		Ok(self.inner.uni_rx.lock().await.recv().await)
	}

	fn send_datagram(&self, payload: Bytes) -> Result<(), MockError> {
		self.inner.datagram_tx.send(payload).map_err(|_| MockError::Closed)
	}

	async fn recv_datagram(&self) -> Result<Option<Bytes>, MockError> {
		Ok(self.inner.datagram_rx.lock().await.recv().await)
	}
}

pub struct MockSendStream {
	tx: Option<mpsc::UnboundedSender<Result<Bytes, MockError>>>,
	stopped: Arc<Mutex<Option<u32>>>,
}

impl SendStream for MockSendStream {
	type Error = MockError;

	async fn write_buf<B: Buf + Send>(&mut self, buf: &mut B) -> Result<usize, MockError> {
		if let Some(code) = *self.stopped.lock().unwrap() {
			return Err(MockError::Stopped(code));
		}

		let tx = self.tx.as_ref().ok_or(MockError::Closed)?;
		let size = buf.remaining();
		let chunk = buf.copy_to_bytes(size);
		tx.send(Ok(chunk)).map_err(|_| MockError::Closed)?;

		Ok(size)
	}

	fn set_priority(&mut self, _priority: u8) {}

	fn finish(&mut self) -> Result<(), MockError> {
		self.tx.take().map(|_| ()).ok_or(MockError::Closed)
	}

	fn reset(&mut self, code: u32) {
		if let Some(tx) = self.tx.take() {
			let _ = tx.send(Err(MockError::Reset(code)));
		}
	}
}

pub struct MockRecvStream {
	rx: mpsc::UnboundedReceiver<Result<Bytes, MockError>>,
	pending: Bytes,
	stopped: Arc<Mutex<Option<u32>>>,
}

impl RecvStream for MockRecvStream {
	type Error = MockError;

	async fn read_buf<B: BufMut + Send>(&mut self, buf: &mut B) -> Result<Option<usize>, MockError> {
		let max = buf.remaining_mut();
		match self.read_chunk(max).await? {
			Some(chunk) => {
				buf.put_slice(&chunk);
				Ok(Some(chunk.len()))
			}
			None => Ok(None),
		}
	}

	async fn read_chunk(&mut self, max: usize) -> Result<Option<Bytes>, MockError> {
		while self.pending.is_empty() {
			match self.rx.recv().await {
				Some(Ok(chunk)) => self.pending = chunk,
				Some(Err(err)) => return Err(err),
				None => return Ok(None),
			}
		}

		let size = max.min(self.pending.len());
		Ok(Some(self.pending.split_to(size)))
	}

	fn stop(&mut self, code: u32) {
		*self.stopped.lock().unwrap() = Some(code);
		self.rx.close();
	}
}
