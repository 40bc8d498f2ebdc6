//! Subscriber setup for the queue processor.
//!
//! Log lines always go to stderr with thread names, so the dedicated worker
//! shows up under its configured name; stdout is left to the CLI. When an
//! OTLP endpoint is configured, spans, metrics and log records are exported
//! as well, tagged with the processor's worker name and queue capacity.

pub mod metrics;
pub mod work;

use opentelemetry::KeyValue;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::SdkTracerProvider;
use opentelemetry_semantic_conventions::resource::SERVICE_VERSION;

use crate::config::{Config, ProcessorConfig};
use crate::error::{Error, Result};

/// Resource attribute carrying the worker thread's name.
pub const WORKER_NAME_ATTR: &str = "taskq.worker.name";
/// Resource attribute carrying the queue bound; absent when unbounded.
pub const QUEUE_CAPACITY_ATTR: &str = "taskq.queue.capacity";

/// Configuration for telemetry initialization.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// OTLP gRPC endpoint. `None` means stderr logging only.
    pub endpoint: Option<String>,
    pub service_name: String,
    /// Fallback filter directive when `RUST_LOG` is unset.
    pub log_level: String,
    pub worker_name: String,
    pub queue_capacity: Option<usize>,
}

impl TelemetryConfig {
    /// Telemetry for a processor built from `processor`, with endpoint and
    /// log level taken from the environment config.
    pub fn for_processor(
        service_name: impl Into<String>,
        config: &Config,
        processor: &ProcessorConfig,
    ) -> Self {
        Self {
            endpoint: config.otel_endpoint.clone(),
            service_name: service_name.into(),
            log_level: config.log_level.clone(),
            worker_name: processor.worker_name.clone(),
            queue_capacity: processor.capacity,
        }
    }

    fn resource(&self) -> Resource {
        let mut attributes = vec![
            KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
            KeyValue::new(WORKER_NAME_ATTR, self.worker_name.clone()),
        ];
        if let Some(capacity) = self.queue_capacity {
            attributes.push(KeyValue::new(QUEUE_CAPACITY_ATTR, capacity as i64));
        }
        Resource::builder()
            .with_service_name(self.service_name.clone())
            .with_attributes(attributes)
            .build()
    }
}

/// The three OTLP pipelines, alive as long as the guard.
struct Exporters {
    traces: SdkTracerProvider,
    metrics: SdkMeterProvider,
    logs: SdkLoggerProvider,
}

impl Exporters {
    fn connect(endpoint: &str, resource: Resource) -> Result<Self> {
        use opentelemetry_otlp::{LogExporter, MetricExporter, SpanExporter, WithExportConfig as _};

        let spans = SpanExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()
            .map_err(|e| exporter_error("span", e))?;
        let metrics = MetricExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()
            .map_err(|e| exporter_error("metric", e))?;
        let logs = LogExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()
            .map_err(|e| exporter_error("log", e))?;

        Ok(Self {
            traces: SdkTracerProvider::builder()
                .with_batch_exporter(spans)
                .with_resource(resource.clone())
                .build(),
            metrics: SdkMeterProvider::builder()
                .with_periodic_exporter(metrics)
                .with_resource(resource.clone())
                .build(),
            logs: SdkLoggerProvider::builder()
                .with_batch_exporter(logs)
                .with_resource(resource)
                .build(),
        })
    }

    /// Logs first so records emitted while spans close still get out.
    fn shutdown(self) {
        let results = [
            ("logs", self.logs.shutdown()),
            ("metrics", self.metrics.shutdown()),
            ("traces", self.traces.shutdown()),
        ];
        for (pipeline, result) in results {
            if let Err(e) = result {
                eprintln!("telemetry: {pipeline} pipeline shutdown failed: {e}");
            }
        }
    }
}

fn exporter_error(signal: &str, e: impl std::fmt::Display) -> Error {
    Error::Other(format!("failed to create OTLP {signal} exporter: {e}"))
}

/// Flushes and shuts down the OTLP pipelines on drop.
///
/// Hold it until the processor has been shut down, so the final drain and
/// its metrics are exported.
pub struct TelemetryGuard {
    exporters: Option<Exporters>,
}

impl TelemetryGuard {
    pub fn is_exporting(&self) -> bool {
        self.exporters.is_some()
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(exporters) = self.exporters.take() {
            exporters.shutdown();
        }
    }
}

/// Install the global subscriber and, with an endpoint, the OTLP pipelines.
///
/// # Errors
///
/// Fails if an exporter cannot be built or a global subscriber is already
/// installed.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard> {
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::layer::SubscriberExt as _;
    use tracing_subscriber::util::SubscriberInitExt as _;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let exporters = match config.endpoint.as_deref() {
        Some(endpoint) => Some(Exporters::connect(endpoint, config.resource())?),
        None => None,
    };
    if let Some(ref exporters) = exporters {
        opentelemetry::global::set_meter_provider(exporters.metrics.clone());
    }

    let trace_layer = exporters.as_ref().map(|exporters| {
        tracing_opentelemetry::layer().with_tracer(exporters.traces.tracer("taskq-rs"))
    });
    let log_layer = exporters
        .as_ref()
        .map(|exporters| OpenTelemetryTracingBridge::new(&exporters.logs));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_thread_names(true)
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(trace_layer)
        .with(log_layer)
        .try_init()
        .map_err(|e| Error::Other(format!("failed to init tracing subscriber: {e}")))?;

    if let Some(endpoint) = config.endpoint.as_deref() {
        tracing::info!(endpoint, worker = %config.worker_name, "exporting telemetry over OTLP");
    }

    Ok(TelemetryGuard { exporters })
}
