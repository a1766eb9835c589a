//! End-to-end demo: simulated requests flowing through the exporter.
//!
//! With `ENGINE_API_KEY` set, reports upload to the configured collector;
//! without it, they print to stdout instead:
//!
//! ```text
//! cargo run --bin demo
//! ENGINE_API_KEY=service:demo:secret cargo run --bin demo
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracewire::{ConsoleSink, Exporter, ExporterConfig, PathStep, RequestInfo, RequestTracer};

#[tokio::main]
async fn main() {
    println!("=== tracewire demo ===\n");

    let config = ExporterConfig::from_env().with_reporting_interval(Duration::from_millis(500));

    let exporter = if config.api_key.is_empty() {
        println!("ENGINE_API_KEY is not set, printing reports to stdout\n");
        Arc::new(Exporter::with_sink(config, Arc::new(ConsoleSink)))
    } else {
        println!("uploading to {}\n", config.endpoint);
        match Exporter::new(config) {
            Ok(exporter) => Arc::new(exporter),
            Err(error) => {
                eprintln!("failed to build exporter: {error}");
                return;
            }
        }
    };
    exporter.start();

    let tracer = Arc::new(RequestTracer::new(Arc::clone(&exporter)).with_decorator(
        |trace, info| {
            if let Some(client) = &info.client_name {
                trace.client_name = client.clone();
            }
        },
    ));

    println!("simulating 8 concurrent requests...");
    let mut requests = Vec::new();
    for request_id in 0..8 {
        let tracer = Arc::clone(&tracer);
        requests.push(tokio::spawn(async move {
            simulate_request(&tracer, request_id).await;
        }));
    }
    for request in requests {
        let _ = request.await;
    }

    println!("flushing...");
    exporter.flush().await;
    exporter.shutdown().await;

    let metrics = exporter.metrics();
    println!("\ntraces recorded: {}", metrics.traces_recorded());
    println!("traces dropped:  {}", metrics.traces_dropped());
    println!("reports sent:    {}", metrics.reports_sent());
    println!("reports failed:  {}", metrics.reports_failed());
}

async fn simulate_request(tracer: &RequestTracer, request_id: usize) {
    let request = tracer.begin_request(RequestInfo {
        operation_name: Some("listPosts".to_string()),
        query: "{ posts { id title } }".to_string(),
        client_name: Some(format!("demo-client-{request_id}")),
        ..RequestInfo::default()
    });

    let posts = [PathStep::field("posts")];
    request.field_start(&posts, "posts", "[Post!]", "Query", Instant::now());
    tokio::time::sleep(Duration::from_millis(5)).await;
    if let Err(error) = request.field_end(&posts, Instant::now()) {
        eprintln!("field event out of order: {error}");
    }

    for index in 0..3 {
        for (field, field_type) in [("id", "ID!"), ("title", "String!")] {
            let path = [
                PathStep::field("posts"),
                PathStep::index(index),
                PathStep::field(field),
            ];
            request.field_start(&path, field, field_type, "Post", Instant::now());
            tokio::time::sleep(Duration::from_millis(1)).await;
            if let Err(error) = request.field_end(&path, Instant::now()) {
                eprintln!("field event out of order: {error}");
            }
        }
    }

    tracer.finish_request(request);
}
