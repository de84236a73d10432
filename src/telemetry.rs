//! OpenTelemetry trace export
//!
//! Spans from the reconcile loop are exported over OTLP/gRPC when
//! `OTEL_EXPORTER_OTLP_ENDPOINT` is set.

use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{trace, Resource};
use tracing::Subscriber;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::registry::LookupSpan;

pub const SERVICE_NAME: &str = "ps-operator";

/// Build the OpenTelemetry layer for `subscriber`
///
/// Returns `None` if the OTLP pipeline cannot be installed; the operator then
/// runs with local logging only.
pub fn init_telemetry<S>(_subscriber: &S) -> Option<OpenTelemetryLayer<S, trace::Tracer>>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    opentelemetry::global::set_text_map_propagator(
        opentelemetry_sdk::propagation::TraceContextPropagator::new(),
    );

    let mut exporter = opentelemetry_otlp::new_exporter().tonic();
    if let Ok(endpoint) = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT") {
        exporter = exporter.with_endpoint(endpoint);
    }

    let tracer = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(exporter)
        .with_trace_config(trace::config().with_resource(Resource::new(vec![
            KeyValue::new("service.name", SERVICE_NAME),
            KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
        ])))
        .install_batch(opentelemetry_sdk::runtime::Tokio);

    match tracer {
        Ok(tracer) => Some(tracing_opentelemetry::layer().with_tracer(tracer)),
        Err(e) => {
            eprintln!("Failed to install OTLP trace pipeline, tracing export disabled: {e}");
            None
        }
    }
}

/// Flush pending spans and shut down the global tracer provider
pub fn shutdown_telemetry() {
    opentelemetry::global::shutdown_tracer_provider();
}
