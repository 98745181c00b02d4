//! The low-level encoding shared by streams and datagrams.
//!
//! You should not need this module directly unless implementing a new transport.

mod decode;
mod encode;
mod reader;
mod varint;
mod writer;

pub use decode::*;
pub use encode::*;
pub use reader::*;
pub use varint::*;
pub use writer::*;
