use tokio::sync::{mpsc, watch};

use crate::{Error, SkipReason};

/// A group's frames, as consumed by the timeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segment {
	/// The group sequence number.
	pub sequence: u64,
	pub track: u64,
}

impl Segment {
	pub fn new(sequence: u64, track: u64) -> Self {
		Self { sequence, track }
	}

	/// Create a producer/consumer pair for the segment's frames.
	pub fn produce<F>(self) -> (SegmentProducer<F>, SegmentConsumer<F>) {
		let (frames_tx, frames_rx) = mpsc::unbounded_channel();
		let (cancel_tx, cancel_rx) = watch::channel(None);

		let producer = SegmentProducer {
			info: self.clone(),
			frames: frames_tx,
			cancel: cancel_rx,
		};

		let consumer = SegmentConsumer {
			info: self,
			frames: frames_rx,
			cancel: cancel_tx,
		};

		(producer, consumer)
	}
}

/// Writes frames to a segment; dropping it ends the segment.
pub struct SegmentProducer<F> {
	pub info: Segment,
	frames: mpsc::UnboundedSender<F>,
	cancel: watch::Receiver<Option<SkipReason>>,
}

impl<F> SegmentProducer<F> {
	/// Returns [Error::Cancel] if the segment was abandoned.
	pub fn write(&mut self, frame: F) -> Result<(), Error> {
		self.frames.send(frame).map_err(|_| Error::Cancel)
	}

	/// End the segment once the consumer has read every frame.
	pub fn close(self) {}

	/// Waits until the consumer abandons the segment, returning why if it was skipped.
	pub async fn cancelled(&mut self) -> Option<SkipReason> {
		loop {
			if let Some(reason) = *self.cancel.borrow_and_update() {
				return Some(reason);
			}

			if self.cancel.changed().await.is_err() {
				return *self.cancel.borrow();
			}
		}
	}
}

/// Reads frames from a segment; dropping it cancels the segment.
pub struct SegmentConsumer<F> {
	pub info: Segment,
	frames: mpsc::UnboundedReceiver<F>,
	cancel: watch::Sender<Option<SkipReason>>,
}

impl<F> SegmentConsumer<F> {
	/// Returns the next frame, or [None] once the producer is finished.
	pub async fn read(&mut self) -> Option<F> {
		self.frames.recv().await
	}

	/// Abandon the segment, notifying the producer.
	pub fn cancel(&mut self, reason: SkipReason) {
		self.cancel.send_replace(Some(reason));
		self.frames.close();
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_frames() {
		let (mut producer, mut consumer) = Segment::new(1, 2).produce();

		producer.write("a").unwrap();
		producer.write("b").unwrap();
		producer.close();

		assert_eq!(consumer.read().await, Some("a"));
		assert_eq!(consumer.read().await, Some("b"));
		assert_eq!(consumer.read().await, None);
	}

	#[tokio::test]
	async fn test_cancel() {
		let (mut producer, mut consumer) = Segment::new(1, 2).produce::<u32>();

		consumer.cancel(SkipReason::TooSlow);
		assert_eq!(producer.cancelled().await, Some(SkipReason::TooSlow));
		assert!(matches!(producer.write(1), Err(Error::Cancel)));
	}

	#[tokio::test]
	async fn test_dropped() {
		let (mut producer, consumer) = Segment::new(1, 2).produce::<u32>();

		drop(consumer);
		assert_eq!(producer.cancelled().await, None);
		assert!(producer.write(1).is_err());
	}
}
