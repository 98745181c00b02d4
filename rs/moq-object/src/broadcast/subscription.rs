use std::future::Future;

use tokio::sync::mpsc;

/// The publisher's response to a subscription.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubscribeReply {
	Ok,
	Close { code: u32, reason: String },
}

/// A request to receive the objects of a named track.
///
/// Held by the publisher; dropped once the subscription has been served.
pub struct Subscription {
	/// The track identifier used in the header of every object sent.
	pub id: u64,

	/// The track name, including an extension (ex. `video.m4s`).
	pub name: String,

	reply: mpsc::UnboundedSender<SubscribeReply>,
}

impl Subscription {
	/// Create a subscription, returning the handle used to observe and cancel it.
	pub fn new(id: u64, name: impl Into<String>) -> (Self, SubscriptionHandle) {
		let (tx, rx) = mpsc::unbounded_channel();

		let subscription = Self {
			id,
			name: name.into(),
			reply: tx,
		};

		(subscription, SubscriptionHandle { replies: rx })
	}

	/// Accept the subscription.
	pub fn ack(&self) {
		let _ = self.reply.send(SubscribeReply::Ok);
	}

	/// Reject or terminate the subscription with a code and reason.
	pub fn close(&self, code: u32, reason: impl Into<String>) {
		let _ = self.reply.send(SubscribeReply::Close {
			code,
			reason: reason.into(),
		});
	}

	/// Waits until the subscriber drops its [SubscriptionHandle].
	pub async fn cancelled(&self) {
		self.reply.closed().await
	}

	// Resolves alongside [Self::cancelled], but can be moved into another task.
	pub(crate) fn cancellation(&self) -> impl Future<Output = ()> + Send + 'static {
		let reply = self.reply.clone();
		async move { reply.closed().await }
	}
}

/// The subscriber's side of a [Subscription].
///
/// Dropping this cancels the task serving the subscription.
pub struct SubscriptionHandle {
	replies: mpsc::UnboundedReceiver<SubscribeReply>,
}

impl SubscriptionHandle {
	/// Returns the next reply, or [None] once the publisher is done with the subscription.
	pub async fn reply(&mut self) -> Option<SubscribeReply> {
		self.replies.recv().await
	}

	/// Waits for the subscription to be closed, returning the code and reason.
	///
	/// Returns [None] if the publisher finished without closing it.
	pub async fn closed(&mut self) -> Option<(u32, String)> {
		loop {
			if let SubscribeReply::Close { code, reason } = self.reply().await? {
				return Some((code, reason));
			}
		}
	}
}

/// A source of incoming subscriptions, typically fed by the session.
pub trait Subscriptions: Send + 'static {
	/// Returns the next subscription, or [None] when there are no more.
	fn accept(&mut self) -> impl Future<Output = Option<Subscription>> + Send;
}

impl Subscriptions for mpsc::Receiver<Subscription> {
	async fn accept(&mut self) -> Option<Subscription> {
		self.recv().await
	}
}

impl Subscriptions for mpsc::UnboundedReceiver<Subscription> {
	async fn accept(&mut self) -> Option<Subscription> {
		self.recv().await
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_replies() {
		let (subscription, mut handle) = Subscription::new(1, "video.m4s");
		assert_eq!(subscription.name, "video.m4s");

		subscription.ack();
		subscription.close(1, "nope");
		drop(subscription);

		assert_eq!(handle.reply().await, Some(SubscribeReply::Ok));
		assert_eq!(handle.reply().await, Some(SubscribeReply::Close {
			code: 1,
			reason: "nope".to_string()
		}));
		assert_eq!(handle.reply().await, None);
	}

	#[tokio::test]
	async fn test_closed() {
		let (subscription, mut handle) = Subscription::new(1, "a.catalog");
		subscription.ack();
		subscription.close(7, "done");
		assert_eq!(handle.closed().await, Some((7, "done".to_string())));

		drop(subscription);
		assert_eq!(handle.closed().await, None);
	}

	#[tokio::test]
	async fn test_cancelled() {
		let (subscription, handle) = Subscription::new(1, "a.m4s");
		drop(handle);
		subscription.cancelled().await;
	}
}
