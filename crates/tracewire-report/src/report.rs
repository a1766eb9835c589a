//! Report assembly and sender identity.
//!
//! A report is one upload: the header identifying this process plus every
//! trace drained from the queue since the last send, grouped by query
//! signature.

use crate::proto::{Report, ReportHeader, Trace, Traces};
use prost::Message;
use std::process::Command;

/// Name and version of this library, reported in every header.
pub fn agent_version() -> String {
    format!("tracewire {}", env!("CARGO_PKG_VERSION"))
}

/// Host name as reported by the `hostname` command, empty if unavailable.
pub fn hostname() -> String {
    command_output("hostname", &[])
}

/// Kernel identity as reported by `uname -a`, empty if unavailable.
pub fn uname() -> String {
    command_output("uname", &["-a"])
}

/// Runtime identity in the interpreter-string style collectors expect.
pub fn runtime_identity() -> String {
    format!(
        "rust [{}-{}]",
        std::env::consts::ARCH,
        std::env::consts::OS
    )
}

/// Graph service id embedded in an API key of the form
/// `service:<id>:<secret>`, empty when the key has no such segment.
pub fn service_from_api_key(api_key: &str) -> String {
    api_key.split(':').nth(1).unwrap_or_default().to_string()
}

fn command_output(program: &str, args: &[&str]) -> String {
    Command::new(program)
        .args(args)
        .output()
        .ok()
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|stdout| stdout.trim().to_string())
        .unwrap_or_default()
}

/// Builds the header attached to every report from this process.
pub fn build_header(
    api_key: &str,
    schema_tag: &str,
    schema_hash: &str,
    service_version: &str,
) -> ReportHeader {
    ReportHeader {
        service: service_from_api_key(api_key),
        hostname: hostname(),
        agent_version: agent_version(),
        service_version: service_version.to_string(),
        runtime_version: runtime_identity(),
        uname: uname(),
        schema_tag: schema_tag.to_string(),
        schema_hash: schema_hash.to_string(),
    }
}

/// Groups one drained batch of `(signature, encoded trace)` entries into a
/// report, preserving arrival order within each signature.
pub fn assemble(header: ReportHeader, entries: Vec<(String, Vec<u8>)>) -> Report {
    let mut report = Report {
        header: Some(header),
        ..Report::default()
    };
    for (key, frame) in entries {
        report
            .traces_per_query
            .entry(key)
            .or_default()
            .trace
            .push(frame);
    }
    report
}

/// Renders a report as pretty JSON for debug logging, decoding each stored
/// trace frame back into a readable tree.
pub fn debug_dump(report: &Report) -> String {
    let mut queries = serde_json::Map::new();
    for (key, traces) in &report.traces_per_query {
        let decoded: Vec<serde_json::Value> = traces
            .trace
            .iter()
            .map(|frame| match Trace::decode(frame.as_slice()) {
                Ok(trace) => {
                    serde_json::to_value(&trace).unwrap_or(serde_json::Value::Null)
                }
                Err(_) => serde_json::Value::String("<undecodable trace frame>".to_string()),
            })
            .collect();
        queries.insert(key.clone(), serde_json::Value::Array(decoded));
    }
    let dump = serde_json::json!({
        "header": report.header,
        "traces_per_query": queries,
    });
    serde_json::to_string_pretty(&dump).unwrap_or_else(|_| "<unprintable report>".to_string())
}
