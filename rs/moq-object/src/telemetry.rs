//! Lightweight application-level telemetry hooks.
//!
//! The object layer reports skipped segments, per-object latency and payload byte counts.
//! Where these end up (a log file, a metrics exporter, nowhere) is up to the application.

use std::{
	fmt,
	sync::{
		Arc,
		atomic::{AtomicU8, AtomicU64, Ordering},
	},
	time::Duration,
};

/// Why the timeline abandoned a segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SkipReason {
	/// The segment arrived after a newer segment was already playing.
	TooOld,

	/// The segment was still playing when a newer segment arrived.
	TooSlow,
}

impl SkipReason {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::TooOld => "too old",
			Self::TooSlow => "too slow",
		}
	}
}

impl fmt::Display for SkipReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// A segment that was abandoned by the timeline.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SkippedSegment {
	pub sequence: u64,
	pub track: u64,
	pub reason: SkipReason,
}

/// The time between an object being sent and being received.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LatencySample {
	pub track: u64,
	pub group: u64,
	pub object: u64,

	/// Milliseconds since the UNIX epoch, as stamped by the sender.
	pub sent: u64,

	/// Milliseconds since the UNIX epoch, according to the receiver's clock.
	pub received: u64,
}

impl LatencySample {
	/// Returns [None] if the clocks are skewed enough that the object arrived before it was sent.
	pub fn latency(&self) -> Option<Duration> {
		self.received.checked_sub(self.sent).map(Duration::from_millis)
	}
}

/// A sink for application-level telemetry.
///
/// Implementations should be fast and non-blocking (e.g., atomics).
pub trait Telemetry: Send + Sync + 'static {
	/// Record a segment abandoned by the timeline.
	fn skipped(&self, skip: &SkippedSegment);

	/// Record the latency of a received object.
	fn latency(&self, sample: &LatencySample);

	/// Record payload bytes received (from the network).
	fn add_rx_bytes(&self, bytes: u64);

	/// Record payload bytes sent (to the network).
	fn add_tx_bytes(&self, bytes: u64);
}

/// Default telemetry sink that does nothing.
#[derive(Default)]
pub struct NoopTelemetry;

impl Telemetry for NoopTelemetry {
	fn skipped(&self, _skip: &SkippedSegment) {}
	fn latency(&self, _sample: &LatencySample) {}
	fn add_rx_bytes(&self, _bytes: u64) {}
	fn add_tx_bytes(&self, _bytes: u64) {}
}

/// Whether the telemetry collector is reachable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Availability {
	Unknown = 0,
	Available = 1,
	Unavailable = 2,
}

/// A shared handle to the collector's availability.
///
/// Cloned into every component that emits telemetry, so one health check can silence them all.
#[derive(Clone, Default)]
pub struct TelemetryStatus(Arc<AtomicU8>);

impl TelemetryStatus {
	pub fn new(availability: Availability) -> Self {
		Self(Arc::new(AtomicU8::new(availability as u8)))
	}

	pub fn get(&self) -> Availability {
		match self.0.load(Ordering::Relaxed) {
			1 => Availability::Available,
			2 => Availability::Unavailable,
			_ => Availability::Unknown,
		}
	}

	pub fn set(&self, availability: Availability) {
		self.0.store(availability as u8, Ordering::Relaxed);
	}

	/// Events are emitted unless the collector is known to be down.
	pub fn is_enabled(&self) -> bool {
		self.get() != Availability::Unavailable
	}
}

/// Emits telemetry as structured [tracing] events under the `moq_object::telemetry` target.
#[derive(Default)]
pub struct TracingTelemetry {
	status: TelemetryStatus,
	rx_bytes: AtomicU64,
	tx_bytes: AtomicU64,
}

impl TracingTelemetry {
	pub fn new(status: TelemetryStatus) -> Self {
		Self {
			status,
			..Default::default()
		}
	}

	pub fn rx_bytes(&self) -> u64 {
		self.rx_bytes.load(Ordering::Relaxed)
	}

	pub fn tx_bytes(&self) -> u64 {
		self.tx_bytes.load(Ordering::Relaxed)
	}
}

impl Telemetry for TracingTelemetry {
	fn skipped(&self, skip: &SkippedSegment) {
		if self.status.is_enabled() {
			tracing::info!(target: "moq_object::telemetry", id = skip.sequence, track = skip.track, reason = %skip.reason, "skipped segment");
		}
	}

	fn latency(&self, sample: &LatencySample) {
		if !self.status.is_enabled() {
			return;
		}

		match sample.latency() {
			Some(latency) => tracing::info!(
				target: "moq_object::telemetry",
				track = sample.track,
				group = sample.group,
				object = sample.object,
				latency_ms = latency.as_millis() as u64,
				"object latency"
			),
			None => tracing::debug!(target: "moq_object::telemetry", ?sample, "clock skew"),
		}
	}

	fn add_rx_bytes(&self, bytes: u64) {
		self.rx_bytes.fetch_add(bytes, Ordering::Relaxed);
	}

	fn add_tx_bytes(&self, bytes: u64) {
		self.tx_bytes.fetch_add(bytes, Ordering::Relaxed);
	}
}

/// Milliseconds since the UNIX epoch.
pub(crate) fn now_millis() -> u64 {
	std::time::SystemTime::now()
		.duration_since(std::time::UNIX_EPOCH)
		.map(|d| d.as_millis() as u64)
		.unwrap_or(0)
}

/// Records everything so tests can make assertions.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordTelemetry {
	pub skipped: std::sync::Mutex<Vec<SkippedSegment>>,
	pub latency: std::sync::Mutex<Vec<LatencySample>>,
	pub rx_bytes: AtomicU64,
	pub tx_bytes: AtomicU64,
}

#[cfg(test)]
impl RecordTelemetry {
	pub fn skips(&self) -> Vec<SkippedSegment> {
		self.skipped.lock().unwrap().clone()
	}
}

#[cfg(test)]
impl Telemetry for RecordTelemetry {
	fn skipped(&self, skip: &SkippedSegment) {
		self.skipped.lock().unwrap().push(skip.clone());
	}

	fn latency(&self, sample: &LatencySample) {
		self.latency.lock().unwrap().push(sample.clone());
	}

	fn add_rx_bytes(&self, bytes: u64) {
		self.rx_bytes.fetch_add(bytes, Ordering::Relaxed);
	}

	fn add_tx_bytes(&self, bytes: u64) {
		self.tx_bytes.fetch_add(bytes, Ordering::Relaxed);
	}
}
