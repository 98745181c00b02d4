//! Objects carried over unreliable datagrams, split into bounded slices.

mod fragment;
mod message;

pub use fragment::*;
pub use message::*;
