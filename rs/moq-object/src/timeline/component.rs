use std::sync::Arc;

use futures::Stream;
use tokio::sync::mpsc;

use crate::{
	Error, NoopTelemetry, SkipReason, SkippedSegment, Telemetry,
	timeline::{Segment, SegmentConsumer, SegmentProducer},
};

/// What the timeline produced next.
#[derive(Debug, PartialEq, Eq)]
pub enum Delivered<F> {
	/// A frame from the current segment.
	Frame(F),

	/// A new segment became current, replacing any previous one.
	SegmentStart(Segment),

	/// The current segment has no more frames.
	SegmentEnd(Segment),
}

// The result of racing the current segment against the queue.
enum Race<F> {
	Frame(Option<F>),
	Segment(Option<SegmentConsumer<F>>),
}

/// Queues segments for a [Component], waiting when the queue is full.
pub struct ComponentProducer<F> {
	segments: mpsc::Sender<SegmentConsumer<F>>,
}

impl<F> Clone for ComponentProducer<F> {
	fn clone(&self) -> Self {
		Self {
			segments: self.segments.clone(),
		}
	}
}

impl<F> ComponentProducer<F> {
	/// Start a new segment, returning the producer for its frames.
	pub async fn segment(&self, segment: Segment) -> Result<SegmentProducer<F>, Error> {
		let (producer, consumer) = segment.produce();
		self.segments.send(consumer).await.map_err(|_| Error::Closed)?;
		Ok(producer)
	}
}

/// An ordered frame sequence for a single media kind.
///
/// At most one segment is current; a newer segment preempts it, while an older one is skipped.
pub struct Component<F> {
	current: Option<SegmentConsumer<F>>,
	segments: mpsc::Receiver<SegmentConsumer<F>>,
	finished: bool,
	telemetry: Arc<dyn Telemetry>,
}

impl<F> Component<F> {
	pub fn produce(capacity: usize) -> (ComponentProducer<F>, Self) {
		let (tx, rx) = mpsc::channel(capacity.max(1));

		let component = Self {
			current: None,
			segments: rx,
			finished: false,
			telemetry: Arc::new(NoopTelemetry),
		};

		(ComponentProducer { segments: tx }, component)
	}

	pub fn with_telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
		self.telemetry = telemetry;
		self
	}

	/// The segment currently being played, if any.
	pub fn current(&self) -> Option<&Segment> {
		self.current.as_ref().map(|current| &current.info)
	}

	/// Returns the next event, or [None] once every producer is gone and the last segment is drained.
	pub async fn next(&mut self) -> Option<Delivered<F>> {
		loop {
			let Some(current) = self.current.as_mut() else {
				if self.finished {
					return None;
				}

				let Some(segment) = self.segments.recv().await else {
					self.finished = true;
					return None;
				};

				if let Some(delivered) = self.preempt(segment) {
					return Some(delivered);
				}
				continue;
			};

			let race = match self.finished {
				true => Race::Frame(current.read().await),
				false => tokio::select! {
					biased;
					frame = current.read() => Race::Frame(frame),
					segment = self.segments.recv() => Race::Segment(segment),
				},
			};

			match race {
				Race::Frame(Some(frame)) => return Some(Delivered::Frame(frame)),
				Race::Frame(None) => {
					let ended = self.current.take()?;
					tracing::trace!(sequence = ended.info.sequence, track = ended.info.track, "segment ended");
					return Some(Delivered::SegmentEnd(ended.info));
				}
				Race::Segment(Some(segment)) => {
					if let Some(delivered) = self.preempt(segment) {
						return Some(delivered);
					}
				}
				// Keep draining the current segment.
				Race::Segment(None) => self.finished = true,
			}
		}
	}

	/// Returns the next frame, skipping over segment boundaries.
	pub async fn next_frame(&mut self) -> Option<F> {
		loop {
			if let Delivered::Frame(frame) = self.next().await? {
				return Some(frame);
			}
		}
	}

	/// Convert into a stream of frames, as fed to a decoder.
	pub fn frames(self) -> impl Stream<Item = F>
	where
		F: Send + 'static,
	{
		futures::stream::unfold(self, |mut component| async move {
			let frame = component.next_frame().await?;
			Some((frame, component))
		})
	}

	/// Abandon the current segment and every queued segment.
	///
	/// No further frames are delivered. Calling this again has no effect.
	pub fn cancel(&mut self) {
		self.current.take();
		self.segments.close();
		while self.segments.try_recv().is_ok() {}
		self.finished = true;
	}

	fn preempt(&mut self, mut segment: SegmentConsumer<F>) -> Option<Delivered<F>> {
		if let Some(current) = &self.current {
			if segment.info.sequence < current.info.sequence {
				self.skip(&mut segment, SkipReason::TooOld);
				return None;
			}
		}

		let info = segment.info.clone();
		if let Some(mut previous) = self.current.replace(segment) {
			self.skip(&mut previous, SkipReason::TooSlow);
		}

		tracing::trace!(sequence = info.sequence, track = info.track, "segment started");

		Some(Delivered::SegmentStart(info))
	}

	fn skip(&self, segment: &mut SegmentConsumer<F>, reason: SkipReason) {
		tracing::debug!(sequence = segment.info.sequence, track = segment.info.track, %reason, "skipping segment");

		self.telemetry.skipped(&SkippedSegment {
			sequence: segment.info.sequence,
			track: segment.info.track,
			reason,
		});

		segment.cancel(reason);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::telemetry::RecordTelemetry;
	use futures::{FutureExt, StreamExt};

	fn setup(capacity: usize) -> (ComponentProducer<&'static str>, Component<&'static str>, Arc<RecordTelemetry>) {
		let telemetry = Arc::new(RecordTelemetry::default());
		let (producer, component) = Component::produce(capacity);
		(producer, component.with_telemetry(telemetry.clone()), telemetry)
	}

	fn start(sequence: u64) -> Option<Delivered<&'static str>> {
		Some(Delivered::SegmentStart(Segment::new(sequence, 1)))
	}

	fn frame(frame: &'static str) -> Option<Delivered<&'static str>> {
		Some(Delivered::Frame(frame))
	}

	#[tokio::test]
	async fn test_sequential() {
		let (producer, mut component, telemetry) = setup(100);

		let mut first = producer.segment(Segment::new(1, 1)).await.unwrap();
		first.write("a").unwrap();
		first.write("b").unwrap();
		first.close();

		let mut second = producer.segment(Segment::new(2, 1)).await.unwrap();
		second.write("c").unwrap();
		second.close();
		drop(producer);

		assert_eq!(component.next().await, start(1));
		assert_eq!(component.next().await, frame("a"));
		assert_eq!(component.next().await, frame("b"));
		assert_eq!(component.next().await, Some(Delivered::SegmentEnd(Segment::new(1, 1))));

		// The second segment was queued the whole time, but it doesn't preempt a finished segment.
		assert_eq!(component.next().await, start(2));
		assert_eq!(component.next().await, frame("c"));
		assert_eq!(component.next().await, Some(Delivered::SegmentEnd(Segment::new(2, 1))));
		assert_eq!(component.next().await, None);

		assert!(telemetry.skips().is_empty());
	}

	#[tokio::test]
	async fn test_too_slow() {
		let (producer, mut component, telemetry) = setup(100);

		let mut seven = producer.segment(Segment::new(7, 1)).await.unwrap();
		seven.write("7a").unwrap();

		assert_eq!(component.next().await, start(7));
		assert_eq!(component.next().await, frame("7a"));

		// Segment 7 is still being produced when 10 arrives.
		let mut ten = producer.segment(Segment::new(10, 1)).await.unwrap();
		ten.write("10a").unwrap();

		assert_eq!(component.next().await, start(10));
		assert_eq!(component.next().await, frame("10a"));
		assert_eq!(component.current(), Some(&Segment::new(10, 1)));

		assert_eq!(seven.cancelled().await, Some(SkipReason::TooSlow));
		assert!(seven.write("7b").is_err());

		assert_eq!(
			telemetry.skips(),
			vec![SkippedSegment {
				sequence: 7,
				track: 1,
				reason: SkipReason::TooSlow
			}]
		);
	}

	#[tokio::test]
	async fn test_too_old() {
		let (producer, mut component, telemetry) = setup(100);

		let mut seven = producer.segment(Segment::new(7, 1)).await.unwrap();
		seven.write("7a").unwrap();

		assert_eq!(component.next().await, start(7));
		assert_eq!(component.next().await, frame("7a"));

		let mut four = producer.segment(Segment::new(4, 1)).await.unwrap();
		four.write("4a").unwrap();

		// Segment 4 is dropped while waiting for the next frame of 7.
		assert!(component.next().now_or_never().is_none());
		assert_eq!(four.cancelled().await, Some(SkipReason::TooOld));

		seven.write("7b").unwrap();
		assert_eq!(component.next().await, frame("7b"));
		assert_eq!(component.current(), Some(&Segment::new(7, 1)));

		assert_eq!(
			telemetry.skips(),
			vec![SkippedSegment {
				sequence: 4,
				track: 1,
				reason: SkipReason::TooOld
			}]
		);
	}

	#[tokio::test]
	async fn test_equal_preempts() {
		let (producer, mut component, telemetry) = setup(100);

		let _first = producer.segment(Segment::new(3, 1)).await.unwrap();
		assert_eq!(component.next().await, start(3));

		let _second = producer.segment(Segment::new(3, 1)).await.unwrap();
		assert_eq!(component.next().await, start(3));

		assert_eq!(telemetry.skips()[0].reason, SkipReason::TooSlow);
	}

	#[tokio::test]
	async fn test_input_closed() {
		let (producer, mut component, _) = setup(100);

		let mut segment = producer.segment(Segment::new(1, 1)).await.unwrap();
		drop(producer);

		assert_eq!(component.next().await, start(1));

		// The queue is closed, but the current segment is drained first.
		segment.write("a").unwrap();
		assert_eq!(component.next().await, frame("a"));

		segment.close();
		assert_eq!(component.next().await, Some(Delivered::SegmentEnd(Segment::new(1, 1))));
		assert_eq!(component.next().await, None);
		assert_eq!(component.next().await, None);
	}

	#[tokio::test]
	async fn test_cancel() {
		let (producer, mut component, telemetry) = setup(100);

		let mut current = producer.segment(Segment::new(1, 1)).await.unwrap();
		assert_eq!(component.next().await, start(1));
		let mut queued = producer.segment(Segment::new(2, 1)).await.unwrap();

		component.cancel();
		component.cancel();

		assert_eq!(current.cancelled().await, None);
		assert_eq!(queued.cancelled().await, None);
		assert!(producer.segment(Segment::new(3, 1)).await.is_err());
		assert_eq!(component.next().await, None);

		// Cancelling isn't skipping.
		assert!(telemetry.skips().is_empty());
	}

	#[tokio::test]
	async fn test_backpressure() {
		let (producer, mut component, _) = setup(1);

		let _first = producer.segment(Segment::new(1, 1)).await.unwrap();
		assert!(producer.segment(Segment::new(2, 1)).now_or_never().is_none());

		assert_eq!(component.next().await, start(1));
		assert!(producer.segment(Segment::new(2, 1)).now_or_never().is_some());
	}

	#[tokio::test]
	async fn test_frames_stream() {
		let (producer, component, _) = setup(100);

		let mut segment = producer.segment(Segment::new(1, 1)).await.unwrap();
		segment.write("a").unwrap();
		segment.write("b").unwrap();
		segment.close();
		drop(producer);

		let frames: Vec<_> = component.frames().collect().await;
		assert_eq!(frames, vec!["a", "b"]);
	}
}
