//! Turns overlapping segments into one ordered, gap-tolerant frame sequence per media kind.

mod component;
mod segment;

pub use component::*;
pub use segment::*;

use std::{fmt, sync::Arc};

use crate::{NoopTelemetry, Telemetry};

#[derive(Clone, Debug)]
pub struct TimelineConfig {
	/// The number of segments that may be queued per component before the producer waits.
	pub capacity: usize,
}

impl Default for TimelineConfig {
	fn default() -> Self {
		Self { capacity: 100 }
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum MediaKind {
	Audio,
	Video,
}

impl fmt::Display for MediaKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Audio => write!(f, "audio"),
			Self::Video => write!(f, "video"),
		}
	}
}

/// The producing side of a [Timeline], one queue per media kind.
pub struct TimelineProducer<F> {
	pub audio: ComponentProducer<F>,
	pub video: ComponentProducer<F>,
}

impl<F> Clone for TimelineProducer<F> {
	fn clone(&self) -> Self {
		Self {
			audio: self.audio.clone(),
			video: self.video.clone(),
		}
	}
}

impl<F> TimelineProducer<F> {
	pub fn component(&self, kind: MediaKind) -> &ComponentProducer<F> {
		match kind {
			MediaKind::Audio => &self.audio,
			MediaKind::Video => &self.video,
		}
	}
}

/// An audio and a video [Component], each consumed independently by its decoder.
pub struct Timeline<F> {
	pub audio: Component<F>,
	pub video: Component<F>,
}

impl<F> Timeline<F> {
	pub fn produce(config: TimelineConfig) -> (TimelineProducer<F>, Self) {
		Self::produce_with_telemetry(config, Arc::new(NoopTelemetry))
	}

	pub fn produce_with_telemetry(config: TimelineConfig, telemetry: Arc<dyn Telemetry>) -> (TimelineProducer<F>, Self) {
		let (audio_tx, audio) = Component::produce(config.capacity);
		let (video_tx, video) = Component::produce(config.capacity);

		let producer = TimelineProducer {
			audio: audio_tx,
			video: video_tx,
		};

		let timeline = Self {
			audio: audio.with_telemetry(telemetry.clone()),
			video: video.with_telemetry(telemetry),
		};

		(producer, timeline)
	}

	pub fn component(&mut self, kind: MediaKind) -> &mut Component<F> {
		match kind {
			MediaKind::Audio => &mut self.audio,
			MediaKind::Video => &mut self.video,
		}
	}

	/// Cancel every current and queued segment of both components.
	pub fn cancel(&mut self) {
		self.audio.cancel();
		self.video.cancel();
	}
}
