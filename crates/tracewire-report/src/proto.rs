//! Wire format for trace reports.
//!
//! Hand-written prost messages matching the collector's ingress schema. The
//! collector only cares about field tags and wire types, so the structs are
//! written out directly instead of generated from a schema file. Tags are
//! load-bearing; everything else is free to follow local convention.
//!
//! [`Timestamp`], [`Node`], [`Trace`], and [`ReportHeader`] also derive
//! `serde::Serialize` so a report can be dumped as readable JSON for debug
//! logging.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock instant, split protobuf-style.
#[derive(Clone, PartialEq, ::prost::Message, serde::Serialize)]
pub struct Timestamp {
    /// Seconds since the Unix epoch.
    #[prost(int64, tag = "1")]
    pub seconds: i64,
    /// Non-negative fractional second, in nanoseconds.
    #[prost(int32, tag = "2")]
    pub nanos: i32,
}

impl From<SystemTime> for Timestamp {
    fn from(time: SystemTime) -> Self {
        // Clocks before the epoch collapse to zero rather than underflow.
        let since_epoch = time.duration_since(UNIX_EPOCH).unwrap_or_default();
        Self {
            seconds: since_epoch.as_secs() as i64,
            nanos: since_epoch.subsec_nanos() as i32,
        }
    }
}

/// One timed span in a trace tree.
///
/// A node is addressed within its parent by its [`node::Id`]: a response
/// field name for object fields, a list index for array elements. The root
/// node of a trace has no id.
#[derive(Clone, PartialEq, ::prost::Message, serde::Serialize)]
pub struct Node {
    /// Type of the value this span produced, e.g. `[Post!]`.
    #[prost(string, tag = "3")]
    pub r#type: String,
    /// Offset from the start of the request, in nanoseconds.
    #[prost(uint64, tag = "8")]
    pub start_time: u64,
    /// Offset from the start of the request, in nanoseconds.
    #[prost(uint64, tag = "9")]
    pub end_time: u64,
    #[prost(message, repeated, tag = "12")]
    pub child: Vec<Node>,
    /// Type the field was resolved on, e.g. `Query`.
    #[prost(string, tag = "13")]
    pub parent_type: String,
    /// Schema field name, set only when the response used an alias.
    #[prost(string, tag = "14")]
    pub original_field_name: String,
    #[prost(oneof = "node::Id", tags = "1, 2")]
    pub id: Option<node::Id>,
}

/// Nested types for [`Node`].
pub mod node {
    /// How a node is addressed within its parent.
    #[derive(Clone, PartialEq, ::prost::Oneof, serde::Serialize)]
    pub enum Id {
        /// Field name as it appears in the response (the alias, if any).
        #[prost(string, tag = "1")]
        ResponseName(String),
        /// Position within a list value.
        #[prost(uint32, tag = "2")]
        Index(u32),
    }
}

/// One request's execution timings.
#[derive(Clone, PartialEq, ::prost::Message, serde::Serialize)]
pub struct Trace {
    #[prost(message, optional, tag = "3")]
    pub end_time: Option<Timestamp>,
    #[prost(message, optional, tag = "4")]
    pub start_time: Option<Timestamp>,
    #[prost(string, tag = "7")]
    pub client_name: String,
    #[prost(string, tag = "8")]
    pub client_version: String,
    #[prost(string, tag = "9")]
    pub client_address: String,
    /// Wall time of the whole request, in nanoseconds.
    #[prost(uint64, tag = "11")]
    pub duration_ns: u64,
    /// Span for the operation itself; children are the top-level fields.
    #[prost(message, optional, tag = "14")]
    pub root: Option<Node>,
}

/// All traces observed for one query signature.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Traces {
    /// Pre-encoded [`Trace`] frames.
    ///
    /// Declared as repeated bytes rather than repeated message: messages and
    /// byte strings share the length-delimited wire type, so frames encoded
    /// once at record time re-encode here without a decode round trip. A
    /// decoder reading this field as `repeated Trace` sees identical bytes.
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub trace: Vec<Vec<u8>>,
}

/// Identity of the process sending reports.
#[derive(Clone, PartialEq, ::prost::Message, serde::Serialize)]
pub struct ReportHeader {
    /// Graph service id, parsed out of the API key.
    #[prost(string, tag = "3")]
    pub service: String,
    #[prost(string, tag = "5")]
    pub hostname: String,
    /// Name and version of this library.
    #[prost(string, tag = "6")]
    pub agent_version: String,
    #[prost(string, tag = "7")]
    pub service_version: String,
    #[prost(string, tag = "8")]
    pub runtime_version: String,
    #[prost(string, tag = "9")]
    pub uname: String,
    /// Schema variant reports are filed under, e.g. `current` or `staging`.
    #[prost(string, tag = "10")]
    pub schema_tag: String,
    #[prost(string, tag = "11")]
    pub schema_hash: String,
}

/// Top-level upload payload: one header plus traces grouped by signature.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Report {
    #[prost(message, optional, tag = "1")]
    pub header: Option<ReportHeader>,
    #[prost(map = "string, message", tag = "5")]
    pub traces_per_query: HashMap<String, Traces>,
}
