use bytes::Bytes;
use tokio::sync::broadcast;

// The number of segments buffered for a slow subscriber before it starts skipping.
const SEGMENT_BACKLOG: usize = 8;

/// A complete media segment (ex. a fragmented MP4 `moof` + `mdat`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaSegment {
	/// Becomes the group sequence number.
	pub sequence: u64,
	pub payload: Bytes,
}

impl MediaSegment {
	pub fn new(sequence: u64, payload: impl Into<Bytes>) -> Self {
		Self {
			sequence,
			payload: payload.into(),
		}
	}
}

/// A media track served as an `.mp4` init segment and `.m4s` segments.
#[derive(Clone)]
pub struct MediaTrack {
	pub init: Bytes,
	segments: broadcast::Sender<MediaSegment>,
}

impl MediaTrack {
	pub fn new(init: impl Into<Bytes>) -> Self {
		let (segments, _) = broadcast::channel(SEGMENT_BACKLOG);
		Self {
			init: init.into(),
			segments,
		}
	}

	/// Send a segment to every current subscriber.
	///
	/// The segment is dropped if nobody is subscribed.
	pub fn publish(&self, segment: MediaSegment) {
		tracing::trace!(sequence = segment.sequence, size = segment.payload.len(), "publishing segment");
		let _ = self.segments.send(segment);
	}

	/// The number of active subscribers.
	pub fn subscribers(&self) -> usize {
		self.segments.receiver_count()
	}

	pub(super) fn subscribe(&self) -> broadcast::Receiver<MediaSegment> {
		self.segments.subscribe()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_publish() {
		let track = MediaTrack::new(Bytes::from_static(b"init"));
		assert_eq!(track.subscribers(), 0);

		// Nobody is listening.
		track.publish(MediaSegment::new(0, Bytes::from_static(b"lost")));

		let mut segments = track.subscribe();
		assert_eq!(track.subscribers(), 1);

		track.publish(MediaSegment::new(1, Bytes::from_static(b"seg")));
		assert_eq!(segments.recv().await.unwrap(), MediaSegment::new(1, Bytes::from_static(b"seg")));
	}
}
