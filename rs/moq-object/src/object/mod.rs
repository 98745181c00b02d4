//! Objects carried over reliable unidirectional streams.

mod header;
mod stream;

pub use header::*;
pub use stream::*;
