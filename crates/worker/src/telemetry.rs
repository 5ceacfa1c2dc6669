//! Optional OpenTelemetry export
//!
//! Enabled when the binary is built with `--features telemetry` and
//! `OTEL_EXPORTER_OTLP_ENDPOINT` is set.
//!
//! ```text
//! OTEL_EXPORTER_OTLP_ENDPOINT=http://localhost:4317 \
//! OTEL_SERVICE_NAME=courier-staging \
//!     ./courier-worker
//! ```

use anyhow::Result;
use tracing_subscriber::{Layer, Registry};

const ENDPOINT_VAR: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";
const DEFAULT_SERVICE_NAME: &str = "courier-worker";

pub type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Whether the environment asks for trace export
pub fn requested() -> bool {
    std::env::var(ENDPOINT_VAR).is_ok()
}

/// Build the OTLP tracing layer, `None` when export is not requested
#[cfg(feature = "telemetry")]
pub fn layer() -> Result<Option<BoxedLayer>> {
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::{runtime, trace::TracerProvider, Resource};

    let Ok(endpoint) = std::env::var(ENDPOINT_VAR) else {
        return Ok(None);
    };
    let service_name =
        std::env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| DEFAULT_SERVICE_NAME.to_string());

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;

    let provider = TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_resource(Resource::new(vec![KeyValue::new(
            "service.name",
            service_name.clone(),
        )]))
        .build();
    let tracer = provider.tracer(service_name);
    opentelemetry::global::set_tracer_provider(provider);

    Ok(Some(tracing_opentelemetry::layer().with_tracer(tracer).boxed()))
}

#[cfg(not(feature = "telemetry"))]
pub fn layer() -> Result<Option<BoxedLayer>> {
    Ok(None)
}

/// Flush pending spans
pub fn shutdown() {
    #[cfg(feature = "telemetry")]
    opentelemetry::global::shutdown_tracer_provider();
}
