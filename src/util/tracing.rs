//! Logging for analysis runs: console output, a dated log file per run and
//! optional OTLP export of spans and log records.

use anyhow::{Context, Result};
use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::{
    LogExporter, SpanExporter, WithExportConfig, WithHttpConfig, WithTonicConfig, tonic_types,
};
use opentelemetry_sdk::logs::{SdkLogger, SdkLoggerProvider};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::SdkTracerProvider;
use opentelemetry_semantic_conventions::resource::{DEPLOYMENT_ENVIRONMENT_NAME, SERVICE_VERSION};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::fs::File;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{Level, Subscriber};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, filter, fmt, prelude::*};

const SERVICE_NAME: &str = env!("CARGO_PKG_NAME");
const EXPORT_TIMEOUT: Duration = Duration::from_secs(10);

static TRACER_PROVIDER: OnceCell<SdkTracerProvider> = OnceCell::const_new();
static LOGGER_PROVIDER: OnceCell<SdkLoggerProvider> = OnceCell::const_new();

type OtlpLogLayer = OpenTelemetryTracingBridge<SdkLoggerProvider, SdkLogger>;

/// Logging settings, read from `LOG_*` environment variables
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub app_name: Option<String>,
    pub level: Option<String>,
    pub file_name: Option<String>,
    pub file_dir: Option<String>,
    pub use_json: bool,
    pub use_stdout: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: None,
            level: None,
            file_name: None,
            file_dir: None,
            use_json: false,
            use_stdout: true,
        }
    }
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self> {
        envy::prefixed("LOG_")
            .from_env::<Self>()
            .context("cannot read logging config from env")
    }

    fn level(&self) -> Level {
        Level::from_str(self.level.as_deref().unwrap_or("INFO")).unwrap_or(Level::INFO)
    }

    fn service_name(&self) -> String {
        self.app_name
            .clone()
            .unwrap_or_else(|| SERVICE_NAME.to_string())
    }

    fn open_log_file(&self) -> Result<Option<Arc<File>>> {
        let Some(file_name) = self.file_name.as_deref() else {
            return Ok(None);
        };
        let dir = match self.file_dir.as_deref() {
            Some(d) => PathBuf::from(d),
            None => env::current_dir()?,
        };
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("create log directory {}", dir.display()))?;
        let path = dir.join(file_name);
        let file = File::options()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("open log file {}", path.display()))?;
        Ok(Some(Arc::new(file)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transport {
    Grpc,
    Http,
}

/// Collector settings, read from `OTLP_*` environment variables.
///
/// Spans go to `OTLP_ADDR` over gRPC, or to `OTLP_HTTP_ADDR` over HTTP when
/// only that one is set. Log records are exported only when
/// `OTLP_LOG_PROTOCOL` is `grpc` or `http`.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct OtlpConfig {
    pub addr: Option<String>,
    pub http_addr: Option<String>,
    /// base64 of `public_key:secret_key`, sent as Basic auth
    pub auth_token: Option<String>,
    pub log_protocol: Option<String>,
    pub log_endpoint: Option<String>,
}

impl OtlpConfig {
    pub fn from_env() -> Result<Self> {
        envy::prefixed("OTLP_")
            .from_env::<Self>()
            .context("cannot read OTLP config from env")
    }

    fn auth_header(&self) -> Option<String> {
        self.auth_token.as_ref().map(|t| format!("Basic {}", t))
    }

    fn span_target(&self) -> Option<(Transport, &str)> {
        match (self.addr.as_deref(), self.http_addr.as_deref()) {
            (Some(addr), _) => Some((Transport::Grpc, addr)),
            (None, Some(addr)) => Some((Transport::Http, addr)),
            (None, None) => None,
        }
    }

    fn log_target(&self) -> Option<(Transport, &str)> {
        let endpoint = self.log_endpoint.as_deref().or(self.addr.as_deref())?;
        match self.log_protocol.as_deref() {
            Some("grpc") => Some((Transport::Grpc, endpoint)),
            Some("http") | Some("http/protobuf") => Some((Transport::Http, endpoint)),
            _ => None,
        }
    }

    fn span_exporter(&self, transport: Transport, endpoint: &str) -> Result<SpanExporter> {
        let exporter = match transport {
            Transport::Grpc => {
                let mut metadata = tonic_types::metadata::MetadataMap::new();
                if let Some(auth) = self.auth_header() {
                    metadata.insert(
                        "authorization",
                        auth.parse().context("invalid OTLP_AUTH_TOKEN")?,
                    );
                }
                SpanExporter::builder()
                    .with_tonic()
                    .with_endpoint(endpoint)
                    .with_timeout(EXPORT_TIMEOUT)
                    .with_metadata(metadata)
                    .build()?
            }
            Transport::Http => {
                let headers: HashMap<String, String> = self
                    .auth_header()
                    .map(|auth| ("Authorization".to_string(), auth))
                    .into_iter()
                    .collect();
                SpanExporter::builder()
                    .with_http()
                    .with_endpoint(endpoint)
                    .with_timeout(EXPORT_TIMEOUT)
                    .with_headers(headers)
                    .build()?
            }
        };
        Ok(exporter)
    }

    fn install_tracer_provider(&self, service_name: &str) -> Result<()> {
        let Some((transport, endpoint)) = self.span_target() else {
            return Ok(());
        };
        let provider = SdkTracerProvider::builder()
            .with_resource(resource(service_name))
            .with_batch_exporter(self.span_exporter(transport, endpoint)?)
            .build();
        global::set_tracer_provider(provider.clone());
        TRACER_PROVIDER.set(provider).ok();
        global::set_text_map_propagator(TraceContextPropagator::new());
        Ok(())
    }

    fn log_layer(&self, service_name: &str) -> Option<OtlpLogLayer> {
        let (transport, endpoint) = self.log_target()?;
        let builder = LogExporter::builder();
        let exporter = match transport {
            Transport::Grpc => builder
                .with_tonic()
                .with_endpoint(endpoint)
                .with_timeout(EXPORT_TIMEOUT)
                .build(),
            Transport::Http => builder
                .with_http()
                .with_endpoint(endpoint)
                .with_timeout(EXPORT_TIMEOUT)
                .build(),
        };
        match exporter {
            Ok(exporter) => {
                let provider = SdkLoggerProvider::builder()
                    .with_resource(resource(service_name))
                    .with_batch_exporter(exporter)
                    .build();
                let layer = OpenTelemetryTracingBridge::new(&provider);
                LOGGER_PROVIDER.set(provider).ok();
                Some(layer)
            }
            Err(e) => {
                eprintln!("OTLP log export disabled: {:?}", e);
                None
            }
        }
    }
}

fn resource(service_name: &str) -> opentelemetry_sdk::Resource {
    opentelemetry_sdk::Resource::builder()
        .with_service_name(service_name.to_string())
        .with_attribute(KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")))
        .with_attribute(KeyValue::new(
            DEPLOYMENT_ENVIRONMENT_NAME,
            env::var("DEPLOYMENT_ENVIRONMENT_NAME").unwrap_or_else(|_| "development".to_string()),
        ))
        .build()
}

/// `<prefix>_<YYYYMMDD>.<ext>`
pub fn dated_file_name(prefix: &str, ext: &str) -> String {
    format!("{}_{}.{}", prefix, chrono::Local::now().format("%Y%m%d"), ext)
}

/// Initialize logging from `LOG_*` and `OTLP_*` env, writing to
/// `<default_dir>/<prefix>_<YYYYMMDD>.log` unless `LOG_FILE_NAME` /
/// `LOG_FILE_DIR` say otherwise.
pub fn init_logging(prefix: &str, default_dir: &str) -> Result<()> {
    // a malformed LOG_* env falls back to defaults
    let conf = LoggingConfig::from_env().unwrap_or_default();
    let conf = LoggingConfig {
        file_name: conf
            .file_name
            .clone()
            .or_else(|| Some(dated_file_name(prefix, "log"))),
        file_dir: conf.file_dir.clone().or_else(|| Some(default_dir.to_string())),
        ..conf
    };
    install(&conf, &OtlpConfig::from_env().unwrap_or_default())
}

pub fn install(conf: &LoggingConfig, otlp: &OtlpConfig) -> Result<()> {
    let level = conf.level();
    let service_name = conf.service_name();
    let log_file = conf.open_log_file()?;

    otlp.install_tracer_provider(&service_name)?;
    let span_layer = TRACER_PROVIDER.get().map(|provider| {
        tracing_opentelemetry::layer().with_tracer(provider.tracer(service_name.clone()))
    });
    // the HTTP stack must not feed its own spans back into the exporter
    let export_filter = EnvFilter::new("info")
        .add_directive("hyper=off".parse()?)
        .add_directive("h2=off".parse()?)
        .add_directive("tonic=off".parse()?)
        .add_directive("reqwest=off".parse()?);
    let log_layer = otlp.log_layer(&service_name).with_filter(export_filter);

    let subscriber = tracing_subscriber::registry()
        .with(filter::Targets::new().with_default(level))
        .with(EnvFilter::from_default_env())
        .with(span_layer)
        .with(log_layer)
        .with(output_layers(conf, level, log_file));
    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber failed")
}

fn output_layers<S>(
    conf: &LoggingConfig,
    level: Level,
    log_file: Option<Arc<File>>,
) -> Vec<Box<dyn Layer<S> + Send + Sync + 'static>>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let mut layers = Vec::new();
    if let Some(file) = log_file {
        let layer = fmt::layer()
            .with_writer(file.with_max_level(level))
            .with_ansi(false);
        layers.push(if conf.use_json {
            layer.json().boxed()
        } else {
            layer.boxed()
        });
    }
    if conf.use_stdout {
        layers.push(if conf.use_json {
            fmt::layer().json().boxed()
        } else {
            fmt::layer().pretty().boxed()
        });
    }
    layers
}

/// Flush and stop the OTLP providers, if any were installed
pub fn shutdown() {
    if let Some(provider) = TRACER_PROVIDER.get() {
        let _ = provider.shutdown().inspect_err(|e| {
            eprintln!("failed to shutdown tracer provider: {:?}", e);
        });
    }
    if let Some(provider) = LOGGER_PROVIDER.get() {
        let _ = provider.shutdown().inspect_err(|e| {
            eprintln!("failed to shutdown logger provider: {:?}", e);
        });
    }
}

// plain stdout logging for tests
pub fn tracing_init_test(level: Level) {
    let _ = tracing_subscriber::fmt().with_max_level(level).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_logging_config_from_iter() {
        let conf: LoggingConfig = envy::prefixed("LOG_")
            .from_iter(vars(&[("LOG_LEVEL", "DEBUG"), ("LOG_USE_JSON", "true")]))
            .unwrap();
        assert_eq!(conf.level(), Level::DEBUG);
        assert!(conf.use_json);
        assert!(conf.use_stdout);
        assert_eq!(conf.file_name, None);
        assert_eq!(conf.service_name(), "transcript-coder");

        let conf = LoggingConfig {
            level: Some("chatty".to_string()),
            ..Default::default()
        };
        assert_eq!(conf.level(), Level::INFO);
    }

    #[test]
    fn test_otlp_targets() {
        let otlp: OtlpConfig = envy::prefixed("OTLP_")
            .from_iter(vars(&[("OTLP_HTTP_ADDR", "http://collector:4318")]))
            .unwrap();
        assert_eq!(
            otlp.span_target(),
            Some((Transport::Http, "http://collector:4318"))
        );
        // no gRPC address, no log export
        assert_eq!(otlp.log_target(), None);

        let otlp: OtlpConfig = envy::prefixed("OTLP_")
            .from_iter(vars(&[
                ("OTLP_ADDR", "http://collector:4317"),
                ("OTLP_HTTP_ADDR", "http://collector:4318"),
                ("OTLP_LOG_PROTOCOL", "http/protobuf"),
                ("OTLP_LOG_ENDPOINT", "http://logs:4318"),
                ("OTLP_AUTH_TOKEN", "a2V5OnNlY3JldA=="),
            ]))
            .unwrap();
        assert_eq!(
            otlp.span_target(),
            Some((Transport::Grpc, "http://collector:4317"))
        );
        assert_eq!(otlp.log_target(), Some((Transport::Http, "http://logs:4318")));
        assert_eq!(otlp.auth_header().as_deref(), Some("Basic a2V5OnNlY3JldA=="));

        assert_eq!(OtlpConfig::default().span_target(), None);
    }

    #[test]
    fn test_dated_file_name() {
        let name = dated_file_name("transcript_coder", "log");
        assert!(name.starts_with("transcript_coder_"));
        assert!(name.ends_with(".log"));
        assert_eq!(name.len(), "transcript_coder_".len() + 8 + 4);
    }

    #[test]
    fn test_open_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let conf = LoggingConfig {
            file_name: Some("run.log".to_string()),
            file_dir: Some(dir.path().join("logs").to_string_lossy().to_string()),
            ..Default::default()
        };
        assert!(conf.open_log_file().unwrap().is_some());
        assert!(dir.path().join("logs").join("run.log").exists());
        assert!(LoggingConfig::default().open_log_file().unwrap().is_none());
    }
}
