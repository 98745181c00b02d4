use std::sync::Arc;

use bytes::Bytes;

use crate::{
	Error, NoopTelemetry, ObjectHeader, Reassembly, Telemetry,
	coding::{Decode, Encode},
	datagram::{Datagram, Fragment},
	transport::Transport,
};

#[derive(Clone, Debug)]
pub struct FragmentConfig {
	/// The maximum payload size of each slice, excluding the sub-header.
	pub slice_size: usize,
}

impl Default for FragmentConfig {
	fn default() -> Self {
		Self { slice_size: 1024 }
	}
}

/// Sends and receives objects as best-effort datagrams.
///
/// There's no acknowledgement or retransmission; lost slices result in a lost object.
pub struct Datagrams<T: Transport> {
	transport: T,
	config: FragmentConfig,
	telemetry: Arc<dyn Telemetry>,
}

impl<T: Transport> Clone for Datagrams<T> {
	fn clone(&self) -> Self {
		Self {
			transport: self.transport.clone(),
			config: self.config.clone(),
			telemetry: self.telemetry.clone(),
		}
	}
}

impl<T: Transport> Datagrams<T> {
	pub fn new(transport: T, config: FragmentConfig) -> Self {
		Self {
			transport,
			config,
			telemetry: Arc::new(NoopTelemetry),
		}
	}

	pub fn with_telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
		self.telemetry = telemetry;
		self
	}

	/// Split the payload into slices, followed by an `end_chunk` marker.
	///
	/// An empty payload results in just the marker.
	pub fn send_fragmented(&self, header: &ObjectHeader, payload: Bytes) -> Result<(), Error> {
		header.validate()?;

		let slice_size = self.config.slice_size.max(1);
		let total = payload.len();

		let mut offset = 0;
		let mut index = 1;

		while offset < total {
			let end = total.min(offset + slice_size);

			self.send(Datagram::Slice(Fragment {
				track: header.track,
				group: header.group,
				object: header.object,
				index,
				payload: payload.slice(offset..end),
			}))?;

			self.telemetry.add_tx_bytes((end - offset) as u64);

			offset = end;
			index += 1;
		}

		self.send(Datagram::EndChunk {
			track: header.track,
			group: header.group,
			object: header.object,
			total: total as u64,
		})?;

		tracing::trace!(track = header.track, group = header.group, object = header.object, slices = index - 1, total, "sent fragmented object");

		Ok(())
	}

	/// Signal that no more objects will be sent for the group.
	pub fn send_end_group(&self, track: u64, group: u64) -> Result<(), Error> {
		tracing::trace!(track, group, "sent end of group");
		self.send(Datagram::EndGroup { track, group })
	}

	fn send(&self, datagram: Datagram) -> Result<(), Error> {
		self.transport
			.send_datagram(datagram.encode_bytes())
			.map_err(Error::transport)
	}

	/// Receive and parse the next datagram, or [None] once the session has ended.
	pub async fn recv(&self) -> Result<Option<Datagram>, Error> {
		let Some(mut payload) = self.transport.recv_datagram().await.map_err(Error::transport)? else {
			return Ok(None);
		};

		let datagram = Datagram::decode(&mut payload)?;
		if let Datagram::Slice(fragment) = &datagram {
			self.telemetry.add_rx_bytes(fragment.payload.len() as u64);
		}

		Ok(Some(datagram))
	}

	/// Feed every received datagram into the reassembly table until the session ends.
	///
	/// Malformed datagrams and corrupted objects are logged and skipped.
	pub async fn run(self, reassembly: Reassembly) -> Result<(), Error> {
		loop {
			let datagram = match self.recv().await {
				Ok(Some(datagram)) => datagram,
				Ok(None) => return Ok(()),
				Err(Error::Protocol(err)) => {
					tracing::warn!(%err, "dropping malformed datagram");
					continue;
				}
				Err(err) => return Err(err),
			};

			if let Err(err) = reassembly.insert(datagram) {
				tracing::warn!(%err, "dropping object");
			}
		}
	}
}
