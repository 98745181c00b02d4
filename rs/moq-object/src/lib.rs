//! # moq-object: Media over QUIC object transport
//!
//! `moq-object` delivers live media as discrete objects, each identified by a `(track, group, object)` triple.
//! Objects are sent either reliably, one per unidirectional stream, or best-effort as fragmented datagrams.
//! The subscriber merges whatever arrives into an ordered, gap-tolerant frame sequence for each decoder.
//!
//! ## API
//!
//! The layers, from the wire up:
//! - [ObjectHeader]: The header that precedes every object payload.
//! - [Objects]: Sends and receives one object per stream via [Objects::send] and [Objects::recv].
//! - [Datagrams]: Splits objects into slices via [Datagrams::send_fragmented] and feeds received slices into a [Reassembly].
//! - [Reassembly]: Collects slices into complete objects, delivered in order per group via [GroupObjects].
//! - [Timeline]: Turns overlapping segments into one frame sequence per [MediaKind], skipping stale segments.
//! - [Broadcast]: Serves catalog, init and media [Subscription]s, one task each.
//!
//! The network is abstracted by the [transport::Transport] trait.
//! Any [web_transport_trait::Session] can be used via [transport::WebTransport].
//!
//! ## Telemetry
//!
//! Skipped segments, object latency and byte counts are reported to a [Telemetry] implementation.
//! The default is [NoopTelemetry]; [TracingTelemetry] emits them as [tracing] events.

mod broadcast;
mod datagram;
mod error;
mod object;
mod reassembly;
mod telemetry;
mod timeline;

pub mod coding;
pub mod transport;

pub use broadcast::*;
pub use datagram::*;
pub use error::*;
pub use object::*;
pub use reassembly::*;
pub use telemetry::*;
pub use timeline::*;
