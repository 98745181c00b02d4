use std::sync::Arc;

use crate::coding::DecodeError;

/// A transport error that can be shared between tasks.
pub trait SendSyncError: std::error::Error + Send + Sync {}

impl<T> SendSyncError for T where T: std::error::Error + Send + Sync {}

/// A list of possible errors that can occur while sending or receiving objects.
#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
	#[error("transport error: {0}")]
	Transport(Arc<dyn SendSyncError>),

	/// A malformed header or datagram; fatal to that stream or datagram only.
	#[error("protocol error: {0}")]
	Protocol(#[from] DecodeError),

	/// The reassembled payload did not match the advertised length.
	#[error("corrupted object: track={track} group={group} object={object} expected={expected} actual={actual}")]
	Corrupted {
		track: u64,
		group: u64,
		object: u64,
		expected: u64,
		actual: u64,
	},

	/// The object arrived after a newer object in the same group was delivered.
	#[error("late object: track={track} group={group} object={object} next={next}")]
	Late {
		track: u64,
		group: u64,
		object: u64,
		next: u64,
	},

	#[error("unknown subscription: {0}")]
	UnknownSubscription(String),

	#[error("cancelled")]
	Cancel,

	#[error("closed")]
	Closed,

	#[error("wrong size")]
	WrongSize,

	#[error("not found")]
	NotFound,

	#[error("timeout")]
	Timeout,
}

impl Error {
	/// An integer code that is sent over the wire when resetting streams or closing subscriptions.
	pub fn to_code(&self) -> u32 {
		match self {
			Self::Cancel => 0,
			Self::Transport(_) => 1,
			Self::Protocol(_) => 2,
			Self::WrongSize => 3,
			Self::Corrupted { .. } => 4,
			Self::Late { .. } => 5,
			Self::UnknownSubscription(_) => 6,
			Self::NotFound => 7,
			Self::Timeout => 8,
			Self::Closed => 9,
		}
	}

	pub(crate) fn transport<E: SendSyncError + 'static>(err: E) -> Self {
		Self::Transport(Arc::new(err))
	}
}
