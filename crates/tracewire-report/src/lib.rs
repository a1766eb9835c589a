//! Wire format and report assembly for the tracewire exporter.
//!
//! This crate owns everything about what goes over the wire and nothing
//! about how it gets there:
//!
//! - [`proto`]: hand-written prost messages for the collector's ingress
//!   schema
//! - [`report`]: header identity and batching of encoded traces into
//!   uploadable reports
//! - [`schema`]: stable SHA-512 digest of an introspection result
//!
//! Queueing, scheduling, and HTTP live in the `tracewire` crate.

pub mod proto;
pub mod report;
pub mod schema;

pub use proto::{Node, Report, ReportHeader, Timestamp, Trace, Traces};
