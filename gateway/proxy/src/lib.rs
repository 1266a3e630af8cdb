#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

//! The Kanali request pipeline.
//!
//! Every request flows through a fixed chain of layers before reaching the [`Gateway`]:
//!
//! ```text
//! Record -> Correlate -> Measure -> Gateway
//! ```
//!
//! The gateway resolves the proxy serving the request, runs the proxy's plugins, and dispatches
//! the request to the proxy's backend: a mock response, a static endpoint, or a cluster service.
//! Failures are rendered as JSON responses; the gateway itself never fails.

mod apikey;
mod body;
mod correlation;
mod error;
mod gateway;
mod metrics;
pub mod plugin;
mod recorder;
mod upstream;

pub use self::{
    apikey::{ApiKeyPlugin, DEFAULT_HEADER, DEFAULT_QUERY_PARAM},
    correlation::{CorrelationId, CorrelationLayer, Correlate, CORRELATION_ID},
    gateway::{Config, Gateway, MatchedProxy},
    metrics::{GatewayMetrics, Measure, MetricsLayer},
    plugin::{Plugin, Registry},
    recorder::{Record, RecordLayer},
    upstream::{HttpUpstream, Upstream},
};

/// The body type of every response the gateway produces.
pub type Body = http_body_util::Full<bytes::Bytes>;
