//! Serves catalog, init and media subscriptions for a single broadcast.
//!
//! Track names are split at the last `.`:
//! - `.catalog` returns the catalog.
//! - `<name>.mp4` returns the init segment for the named track.
//! - `<name>.m4s` returns every segment produced for the named track, one group each.

mod subscription;
mod track;

pub use subscription::*;
pub use track::*;

use std::{collections::HashMap, sync::Arc};

use bytes::Bytes;
use tokio::sync::broadcast::error::RecvError;

use crate::{Datagrams, Error, FragmentConfig, NoopTelemetry, ObjectHeader, Objects, Telemetry, transport::Transport};

/// How `.m4s` segments are delivered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum BroadcastMode {
	/// Each segment is a single object on a reliable stream.
	#[default]
	Stream,

	/// Each segment is announced with an empty stream object, then sent as datagram slices.
	Datagram,
}

#[derive(Clone, Debug)]
pub struct BroadcastConfig {
	pub mode: BroadcastMode,

	/// The number of seconds each segment may be cached, or 0 for never.
	pub expires: u64,

	/// Only used in [BroadcastMode::Datagram].
	pub fragment: FragmentConfig,
}

impl Default for BroadcastConfig {
	fn default() -> Self {
		Self {
			mode: BroadcastMode::Stream,
			expires: 30,
			fragment: FragmentConfig::default(),
		}
	}
}

/// The close code used when a subscription can't be served.
pub const SUBSCRIBE_FAILED: u32 = 1;

/// A catalog and a set of named media tracks.
#[derive(Clone)]
pub struct Broadcast {
	catalog: Bytes,
	tracks: Arc<HashMap<String, MediaTrack>>,
	config: BroadcastConfig,
	telemetry: Arc<dyn Telemetry>,
}

impl Broadcast {
	pub fn new(catalog: impl Into<Bytes>, config: BroadcastConfig) -> Self {
		Self {
			catalog: catalog.into(),
			tracks: Default::default(),
			config,
			telemetry: Arc::new(NoopTelemetry),
		}
	}

	pub fn with_telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
		self.telemetry = telemetry;
		self
	}

	/// Add a media track, replacing any existing track with the same name.
	pub fn with_track(mut self, name: impl Into<String>, track: MediaTrack) -> Self {
		let name = name.into();
		if Arc::make_mut(&mut self.tracks).insert(name.clone(), track).is_some() {
			tracing::warn!(track = %name, "track already exists, replacing it");
		}
		self
	}

	pub fn track(&self, name: &str) -> Option<&MediaTrack> {
		self.tracks.get(name)
	}

	/// Serve every incoming subscription on its own task, until there are no more.
	///
	/// A failed subscription is closed; it never stops the loop.
	pub async fn run<T: Transport, S: Subscriptions>(self, transport: T, mut subscriptions: S) {
		let objects = Objects::new(transport.clone()).with_telemetry(self.telemetry.clone());
		let datagrams = Datagrams::new(transport, self.config.fragment.clone()).with_telemetry(self.telemetry.clone());

		while let Some(subscription) = subscriptions.accept().await {
			let this = self.clone();
			let objects = objects.clone();
			let datagrams = datagrams.clone();

			web_async::spawn(async move {
				this.serve(subscription, objects, datagrams).await;
			});
		}

		tracing::debug!("no more subscriptions");
	}

	async fn serve<T: Transport>(self, subscription: Subscription, objects: Objects<T>, datagrams: Datagrams<T>) {
		let id = subscription.id;
		tracing::info!(id, track = %subscription.name, "subscribe started");

		let res = tokio::select! {
			res = self.serve_track(&subscription, &objects, &datagrams) => res,
			_ = subscription.cancelled() => Err(Error::Cancel),
		};

		match res {
			Ok(()) => tracing::info!(id, track = %subscription.name, "subscribe complete"),
			Err(Error::Cancel) => tracing::info!(id, track = %subscription.name, "subscribe cancelled"),
			Err(err) => {
				tracing::warn!(%err, id, track = %subscription.name, "subscribe failed");
				subscription.close(SUBSCRIBE_FAILED, format!("failed to process subscribe: {err}"));
			}
		}
	}

	async fn serve_track<T: Transport>(
		&self,
		subscription: &Subscription,
		objects: &Objects<T>,
		datagrams: &Datagrams<T>,
	) -> Result<(), Error> {
		let (base, ext) = split_ext(&subscription.name);

		match ext {
			Some("catalog") => self.serve_catalog(subscription, base, objects).await,
			Some("mp4") => self.serve_init(subscription, base, objects).await,
			Some("m4s") => self.serve_segments(subscription, base, objects, datagrams).await,
			_ => Err(Error::UnknownSubscription(subscription.name.clone())),
		}
	}

	async fn serve_catalog<T: Transport>(
		&self,
		subscription: &Subscription,
		base: &str,
		objects: &Objects<T>,
	) -> Result<(), Error> {
		// There's only one catalog.
		if !base.is_empty() {
			return Err(Error::UnknownSubscription(subscription.name.clone()));
		}

		subscription.ack();
		write_object(objects, ObjectHeader::new(subscription.id, 0, 0), self.catalog.clone()).await
	}

	async fn serve_init<T: Transport>(
		&self,
		subscription: &Subscription,
		base: &str,
		objects: &Objects<T>,
	) -> Result<(), Error> {
		let track = self.tracks.get(base).ok_or(Error::NotFound)?;

		subscription.ack();
		write_object(objects, ObjectHeader::new(subscription.id, 0, 0), track.init.clone()).await
	}

	async fn serve_segments<T: Transport>(
		&self,
		subscription: &Subscription,
		base: &str,
		objects: &Objects<T>,
		datagrams: &Datagrams<T>,
	) -> Result<(), Error> {
		let track = self.tracks.get(base).ok_or(Error::NotFound)?;
		let mut segments = track.subscribe();

		subscription.ack();

		loop {
			let segment = match segments.recv().await {
				Ok(segment) => segment,
				Err(RecvError::Lagged(skipped)) => {
					tracing::warn!(id = subscription.id, skipped, "subscriber too slow, skipping segments");
					continue;
				}
				Err(RecvError::Closed) => return Ok(()),
			};

			let header = ObjectHeader {
				expires: (self.config.expires > 0).then_some(self.config.expires),
				..ObjectHeader::new(subscription.id, segment.sequence, 0)
			};

			let mode = self.config.mode;
			let objects = objects.clone();
			let datagrams = datagrams.clone();
			let cancelled = subscription.cancellation();

			// Serve each segment in parallel so a slow one doesn't hold up the next.
			web_async::spawn(async move {
				let group = header.group;
				tokio::select! {
					res = serve_segment(mode, header, segment.payload, &objects, &datagrams) => {
						if let Err(err) = res {
							tracing::warn!(%err, group, "failed to serve segment");
						}
					}
					_ = cancelled => tracing::debug!(group, "segment cancelled"),
				}
			});
		}
	}
}

async fn serve_segment<T: Transport>(
	mode: BroadcastMode,
	header: ObjectHeader,
	payload: Bytes,
	objects: &Objects<T>,
	datagrams: &Datagrams<T>,
) -> Result<(), Error> {
	match mode {
		BroadcastMode::Stream => write_object(objects, header, payload).await,
		BroadcastMode::Datagram => {
			let announce = ObjectHeader {
				size: Some(0),
				..header.clone()
			};
			objects.send(announce).await?.close()?;

			datagrams.send_fragmented(&header, payload)?;
			datagrams.send_end_group(header.track, header.group)
		}
	}
}

async fn write_object<T: Transport>(objects: &Objects<T>, header: ObjectHeader, payload: Bytes) -> Result<(), Error> {
	let mut writer = objects.send(header).await?;
	writer.write(payload).await?;
	writer.close()
}

// Split a track name at the last `.` into the base and extension.
fn split_ext(name: &str) -> (&str, Option<&str>) {
	match name.rsplit_once('.') {
		Some((base, ext)) => (base, Some(ext)),
		None => (name, None),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		Reassembly,
		transport::mock::{self, MockTransport},
	};
	use std::time::Duration;
	use tokio::sync::mpsc;

	const CATALOG: &[u8] = br#"{"tracks":[]}"#;

	struct Setup {
		track: MediaTrack,
		subscriptions: mpsc::UnboundedSender<Subscription>,
		publisher: MockTransport,
		subscriber: MockTransport,
	}

	fn setup(config: BroadcastConfig) -> Setup {
		let (publisher, subscriber) = mock::pair();
		let (tx, rx) = mpsc::unbounded_channel();

		let track = MediaTrack::new(Bytes::from_static(b"init"));
		let broadcast = Broadcast::new(Bytes::from_static(CATALOG), config).with_track("video", track.clone());

		tokio::spawn(broadcast.run(publisher.clone(), rx));

		Setup {
			track,
			subscriptions: tx,
			publisher,
			subscriber,
		}
	}

	impl Setup {
		fn subscribe(&self, id: u64, name: &str) -> SubscriptionHandle {
			let (subscription, handle) = Subscription::new(id, name);
			self.subscriptions.send(subscription).unwrap();
			handle
		}

		async fn recv(&self) -> (ObjectHeader, Bytes) {
			let objects = Objects::new(self.subscriber.clone());
			let (header, mut reader) = objects.recv().await.unwrap().unwrap();
			let payload = reader.read_all().await.unwrap();
			(header, payload)
		}
	}

	#[test]
	fn test_split_ext() {
		assert_eq!(split_ext(".catalog"), ("", Some("catalog")));
		assert_eq!(split_ext("video.m4s"), ("video", Some("m4s")));
		assert_eq!(split_ext("a.b.mp4"), ("a.b", Some("mp4")));
		assert_eq!(split_ext("video"), ("video", None));
	}

	#[tokio::test]
	async fn test_catalog() {
		let setup = setup(BroadcastConfig::default());

		let mut handle = setup.subscribe(1, ".catalog");
		assert_eq!(handle.reply().await, Some(SubscribeReply::Ok));

		let (header, payload) = setup.recv().await;
		assert_eq!((header.track, header.group, header.object), (1, 0, 0));
		assert_eq!(header.expires, None);
		assert_eq!(payload, Bytes::from_static(CATALOG));

		// Served and done.
		assert_eq!(handle.reply().await, None);
	}

	#[tokio::test]
	async fn test_named_catalog() {
		let setup = setup(BroadcastConfig::default());

		let mut handle = setup.subscribe(1, "foo.catalog");
		let (code, reason) = handle.closed().await.unwrap();
		assert_eq!(code, SUBSCRIBE_FAILED);
		assert!(reason.contains("unknown subscription"), "{reason}");
	}

	#[tokio::test]
	async fn test_unknown_extension() {
		let setup = setup(BroadcastConfig::default());

		for name in ["foo.xyz", "foo"] {
			let mut handle = setup.subscribe(1, name);
			let (code, reason) = handle.closed().await.unwrap();
			assert_ne!(code, 0);
			assert!(reason.starts_with("failed to process subscribe: "), "{reason}");
			assert!(reason.contains("unknown subscription"), "{reason}");
		}
	}

	#[tokio::test]
	async fn test_init() {
		let setup = setup(BroadcastConfig::default());

		let mut handle = setup.subscribe(2, "video.mp4");
		assert_eq!(handle.reply().await, Some(SubscribeReply::Ok));

		let (header, payload) = setup.recv().await;
		assert_eq!(header.track, 2);
		assert_eq!(payload, Bytes::from_static(b"init"));

		let mut missing = setup.subscribe(3, "audio.mp4");
		let (code, reason) = missing.closed().await.unwrap();
		assert_eq!(code, SUBSCRIBE_FAILED);
		assert_eq!(reason, "failed to process subscribe: not found");
	}

	#[tokio::test]
	async fn test_failure_isolated() {
		let setup = setup(BroadcastConfig::default());

		let mut bad = setup.subscribe(1, "bad.xyz");
		let mut good = setup.subscribe(2, ".catalog");

		assert!(bad.closed().await.is_some());
		assert_eq!(good.reply().await, Some(SubscribeReply::Ok));

		let (header, _) = setup.recv().await;
		assert_eq!(header.track, 2);
	}

	#[tokio::test]
	async fn test_segments_stream() {
		let setup = setup(BroadcastConfig::default());

		let mut handle = setup.subscribe(4, "video.m4s");
		assert_eq!(handle.reply().await, Some(SubscribeReply::Ok));

		setup.track.publish(MediaSegment::new(12, Bytes::from_static(b"segment")));

		let (header, payload) = setup.recv().await;
		assert_eq!((header.track, header.group, header.object), (4, 12, 0));
		assert_eq!(header.expires, Some(30));
		assert_eq!(header.size, None);
		assert_eq!(payload, Bytes::from_static(b"segment"));
	}

	#[tokio::test]
	async fn test_segments_datagram() {
		let config = BroadcastConfig {
			mode: BroadcastMode::Datagram,
			fragment: FragmentConfig { slice_size: 3 },
			..Default::default()
		};
		let setup = setup(config);

		let reassembly = Reassembly::default();
		let mut groups = reassembly.track(5);
		let datagrams = Datagrams::new(setup.subscriber.clone(), FragmentConfig::default());
		tokio::spawn(datagrams.run(reassembly.clone()));

		let mut handle = setup.subscribe(5, "video.m4s");
		assert_eq!(handle.reply().await, Some(SubscribeReply::Ok));

		setup.track.publish(MediaSegment::new(20, Bytes::from_static(b"fragmented")));

		// The segment is announced with an empty object.
		let (header, payload) = setup.recv().await;
		assert_eq!((header.track, header.group, header.size), (5, 20, Some(0)));
		assert!(payload.is_empty());

		let mut objects = groups.next().await.unwrap();
		assert_eq!(objects.group, 20);

		let object = objects.next().await.unwrap();
		assert_eq!(object.header.object, 0);
		assert_eq!(object.payload, Bytes::from_static(b"fragmented"));
		assert!(objects.next().await.is_none());
	}

	#[tokio::test]
	async fn test_cancel() {
		let setup = setup(BroadcastConfig::default());

		let mut handle = setup.subscribe(4, "video.m4s");
		assert_eq!(handle.reply().await, Some(SubscribeReply::Ok));
		assert_eq!(setup.track.subscribers(), 1);

		drop(handle);

		tokio::time::timeout(Duration::from_secs(1), async {
			while setup.track.subscribers() > 0 {
				tokio::task::yield_now().await;
			}
		})
		.await
		.expect("serving task was not cancelled");
	}

	#[tokio::test]
	async fn test_cancel_in_flight_segment() {
		let setup = setup(BroadcastConfig::default());

		let mut handle = setup.subscribe(6, "video.m4s");
		assert_eq!(handle.reply().await, Some(SubscribeReply::Ok));

		// The segment gets stuck waiting for a stream.
		setup.publisher.hold_streams(true);
		setup.track.publish(MediaSegment::new(30, Bytes::from_static(b"stuck")));
		tokio::time::sleep(Duration::from_millis(10)).await;

		drop(handle);
		while setup.track.subscribers() > 0 {
			tokio::task::yield_now().await;
		}
		tokio::time::sleep(Duration::from_millis(10)).await;

		// Nothing is delivered once the stream becomes available.
		setup.publisher.hold_streams(false);

		let objects = Objects::new(setup.subscriber.clone());
		let res = tokio::time::timeout(Duration::from_millis(100), objects.recv()).await;
		assert!(res.is_err(), "cancelled segment was still delivered");
	}
}
