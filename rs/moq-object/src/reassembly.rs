//! Merges datagram slices into complete objects, delivered in order per group.
//!
//! Each `(track, group)` has its own entry and lock; the table lock is only held to find, insert or remove entries.
//! A group goes from open, to completing once the end marker arrives or it goes idle, to closed once drained.

use std::{
	collections::{BTreeMap, HashMap, VecDeque},
	sync::Arc,
	time::Duration,
};

use bytes::{Bytes, BytesMut};
use tokio::{sync::mpsc, time::Instant};
use web_async::Lock;

use crate::{
	Error, ObjectHeader,
	datagram::{Datagram, Fragment},
};

#[derive(Clone, Debug)]
pub struct ReassemblyConfig {
	/// A group is closed after this long without receiving anything.
	pub inactivity: Duration,

	/// The number of recently closed groups remembered per track, so stragglers are ignored.
	pub tombstones: usize,
}

impl Default for ReassemblyConfig {
	fn default() -> Self {
		Self {
			inactivity: Duration::from_secs(2),
			tombstones: 32,
		}
	}
}

/// A complete, reassembled object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Object {
	pub header: ObjectHeader,
	pub payload: Bytes,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Status {
	Open,
	Completing,
	Closed,
}

struct GroupState {
	next: u64,
	pending: BTreeMap<u64, Vec<Fragment>>,
	status: Status,
	deadline: Instant,

	output: Option<mpsc::UnboundedSender<Object>>,

	// Taken by whoever consumes the group.
	consumer: Option<mpsc::UnboundedReceiver<Object>>,
}

#[derive(Default)]
struct TrackState {
	groups: HashMap<u64, Lock<GroupState>>,
	closed: VecDeque<u64>,
	announce: Option<mpsc::UnboundedSender<GroupObjects>>,
}

impl TrackState {
	fn tombstone(&mut self, group: u64, limit: usize) {
		if self.closed.contains(&group) {
			return;
		}

		self.closed.push_back(group);
		while self.closed.len() > limit {
			self.closed.pop_front();
		}
	}
}

/// The table of groups currently being reassembled.
///
/// Entries are created on demand, which spawns a watchdog task, so this must be used within a runtime.
#[derive(Clone, Default)]
pub struct Reassembly {
	tracks: Lock<HashMap<u64, TrackState>>,
	config: Arc<ReassemblyConfig>,
}

impl Reassembly {
	pub fn new(config: ReassemblyConfig) -> Self {
		Self {
			tracks: Default::default(),
			config: Arc::new(config),
		}
	}

	/// Apply a single datagram.
	///
	/// Late and stray data is logged and ignored; only a length mismatch is returned as an error.
	pub fn insert(&self, datagram: Datagram) -> Result<(), Error> {
		match datagram {
			Datagram::Slice(fragment) => {
				self.insert_slice(fragment);
				Ok(())
			}
			Datagram::EndChunk {
				track,
				group,
				object,
				total,
			} => self.end_chunk(track, group, object, total),
			Datagram::EndGroup { track, group } => {
				self.end_group(track, group);
				Ok(())
			}
		}
	}

	/// Take the ordered output of a group, creating the entry if needed.
	///
	/// Returns [None] if the group was recently closed or somebody else is already consuming it.
	pub fn consume(&self, track: u64, group: u64) -> Option<GroupObjects> {
		let entry = self.group(track, group, true)?;
		let consumer = entry.lock().consumer.take()?;
		Some(GroupObjects::new(self.clone(), track, group, consumer))
	}

	/// Hand over the output of every group created for the track from now on.
	///
	/// This replaces any previous listener for the same track.
	pub fn track(&self, track: u64) -> TrackGroups {
		let (tx, rx) = mpsc::unbounded_channel();
		self.tracks.lock().entry(track).or_default().announce = Some(tx);
		TrackGroups { track, groups: rx }
	}

	fn insert_slice(&self, fragment: Fragment) {
		let (track, group, object) = (fragment.track, fragment.group, fragment.object);

		let Some(entry) = self.group(track, group, true) else {
			tracing::trace!(track, group, object, "dropping fragment for closed group");
			return;
		};

		let mut state = entry.lock();
		if state.status != Status::Open {
			tracing::trace!(track, group, object, status = ?state.status, "dropping fragment for completed group");
			return;
		}

		if object < state.next {
			tracing::debug!(track, group, object, next = state.next, "dropping late fragment");
			return;
		}

		tracing::trace!(track, group, object, index = fragment.index, size = fragment.payload.len(), "received fragment");

		state.deadline = Instant::now() + self.config.inactivity;
		state.pending.entry(object).or_default().push(fragment);
	}

	fn end_chunk(&self, track: u64, group: u64, object: u64, total: u64) -> Result<(), Error> {
		let Some(entry) = self.group(track, group, true) else {
			tracing::trace!(track, group, object, "dropping end of object for closed group");
			return Ok(());
		};

		let mut state = entry.lock();
		if state.status != Status::Open {
			return Ok(());
		}

		state.deadline = Instant::now() + self.config.inactivity;

		if object < state.next {
			state.pending.remove(&object);

			let err = Error::Late {
				track,
				group,
				object,
				next: state.next,
			};
			tracing::warn!(%err, "discarding late object");

			return Ok(());
		}

		let mut fragments = state.pending.remove(&object).unwrap_or_default();
		fragments.sort_by_key(|fragment| fragment.index);
		fragments.dedup_by_key(|fragment| fragment.index);

		// The advertised total is untrusted, so only allocate once it matches what arrived.
		let actual = fragments.iter().map(|fragment| fragment.payload.len() as u64).sum::<u64>();
		if actual != total {
			return Err(Error::Corrupted {
				track,
				group,
				object,
				expected: total,
				actual,
			});
		}

		let mut payload = BytesMut::with_capacity(actual as usize);
		for fragment in &fragments {
			payload.extend_from_slice(&fragment.payload);
		}

		state.next = object + 1;

		// Anything older can never be delivered now.
		let next = state.next;
		state.pending = state.pending.split_off(&next);

		tracing::debug!(track, group, object, size = total, slices = fragments.len(), "reassembled object");

		if let Some(output) = &state.output {
			let header = ObjectHeader {
				size: Some(total),
				..ObjectHeader::new(track, group, object)
			};

			// The consumer may have gone away; that's fine.
			let _ = output.send(Object {
				header,
				payload: payload.freeze(),
			});
		}

		Ok(())
	}

	fn end_group(&self, track: u64, group: u64) {
		tracing::debug!(track, group, "end of group");

		match self.group(track, group, false) {
			Some(entry) => self.complete(track, group, &entry),
			None => self
				.tracks
				.lock()
				.entry(track)
				.or_default()
				.tombstone(group, self.config.tombstones),
		}
	}

	// Find the entry for a group, optionally creating it.
	fn group(&self, track: u64, group: u64, create: bool) -> Option<Lock<GroupState>> {
		let (entry, announce) = {
			let mut tracks = self.tracks.lock();
			let state = match create {
				true => tracks.entry(track).or_default(),
				false => tracks.get_mut(&track)?,
			};

			if let Some(entry) = state.groups.get(&group) {
				return Some(entry.clone());
			}

			if !create || state.closed.contains(&group) {
				return None;
			}

			let (tx, rx) = mpsc::unbounded_channel();
			let entry = Lock::new(GroupState {
				next: 0,
				pending: BTreeMap::new(),
				status: Status::Open,
				deadline: Instant::now() + self.config.inactivity,
				output: Some(tx),
				consumer: Some(rx),
			});

			state.groups.insert(group, entry.clone());

			let announce = state.announce.clone().filter(|announce| !announce.is_closed());
			(entry, announce)
		};

		tracing::debug!(track, group, "created group");

		self.watch(track, group, entry.clone());

		if let Some(announce) = announce {
			let consumer = entry.lock().consumer.take();
			if let Some(consumer) = consumer {
				let _ = announce.send(GroupObjects::new(self.clone(), track, group, consumer));
			}
		}

		Some(entry)
	}

	// Close the group once it has been idle for too long.
	fn watch(&self, track: u64, group: u64, entry: Lock<GroupState>) {
		let this = self.clone();

		web_async::spawn(async move {
			loop {
				let deadline = {
					let state = entry.lock();
					if state.status != Status::Open {
						return;
					}
					state.deadline
				};

				tokio::time::sleep_until(deadline).await;

				let expired = entry.lock().deadline <= Instant::now();
				if expired {
					tracing::debug!(track, group, err = %Error::Timeout, "group inactive");
					this.complete(track, group, &entry);
					return;
				}
			}
		});
	}

	// No more objects will be delivered; close the output so the consumer sees the end after draining.
	fn complete(&self, track: u64, group: u64, entry: &Lock<GroupState>) {
		let untaken = {
			let mut state = entry.lock();
			if state.status != Status::Open {
				return;
			}

			state.status = Status::Completing;
			state.output.take();
			state.pending.clear();
			state.consumer.take().is_some()
		};

		// Nobody is going to drain it.
		if untaken {
			self.remove(track, group);
		}
	}

	fn remove(&self, track: u64, group: u64) {
		let entry = {
			let mut tracks = self.tracks.lock();
			let Some(state) = tracks.get_mut(&track) else {
				return;
			};

			let entry = state.groups.remove(&group);
			if entry.is_some() {
				state.tombstone(group, self.config.tombstones);
			}
			entry
		};

		if let Some(entry) = entry {
			let mut state = entry.lock();
			state.status = Status::Closed;
			state.output.take();
			state.pending.clear();

			tracing::debug!(track, group, "closed group");
		}
	}
}

/// The ordered output of a single group.
///
/// Dropping this closes the group, so any further fragments are ignored.
pub struct GroupObjects {
	pub track: u64,
	pub group: u64,

	objects: mpsc::UnboundedReceiver<Object>,
	table: Reassembly,
}

impl GroupObjects {
	fn new(table: Reassembly, track: u64, group: u64, objects: mpsc::UnboundedReceiver<Object>) -> Self {
		Self {
			track,
			group,
			objects,
			table,
		}
	}

	/// Returns the next complete object, or [None] once the group has been completed and drained.
	pub async fn next(&mut self) -> Option<Object> {
		let object = self.objects.recv().await;
		if object.is_none() {
			self.table.remove(self.track, self.group);
		}
		object
	}
}

impl Drop for GroupObjects {
	fn drop(&mut self) {
		self.table.remove(self.track, self.group);
	}
}

/// Newly created groups for a single track.
pub struct TrackGroups {
	pub track: u64,
	groups: mpsc::UnboundedReceiver<GroupObjects>,
}

impl TrackGroups {
	/// Waits for the next group to be created.
	pub async fn next(&mut self) -> Option<GroupObjects> {
		self.groups.recv().await
	}
}
