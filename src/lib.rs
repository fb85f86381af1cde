//! A host-side driver for Bronkhorst's Propar protocol: the binary and ASCII
//! wire framings, the chained parameter request/response codec, a request
//! multiplexer running a background reader thread, and a [`Master`] facade
//! tying them together with an optional parameter catalogue.

#[macro_use]
mod log;

mod endian;
mod error;
mod mux;

pub mod catalogue;
pub mod codec;
pub mod descriptor;
pub mod framer;
pub mod master;
pub mod status;
pub mod transport;
pub mod types;

pub use catalogue::{Catalogue, EnumValue};
pub use descriptor::Descriptor;
pub use error::{BufferTooSmallError, CatalogueLoadError, UnknownDdeNumber};
pub use framer::ascii::AsciiFramer;
pub use framer::binary::BinaryFramer;
pub use framer::{FeedEvent, Frame, Framer};
pub use master::{Master, NodeInfo};
pub use mux::{Outcome, RequestKind};
pub use status::Status;
pub use transport::{Transport, TransportOpenError};
pub use types::{ParmType, Value, WireType, WireValue};

#[cfg(feature = "serial2")]
pub use transport::Serial2Transport;
