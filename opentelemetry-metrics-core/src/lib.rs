//! # OpenTelemetry Metrics Core
//!
//! The collection and export orchestration core of the OpenTelemetry metrics
//! SDK. It owns the lifetime of [`Meter`]s, binds any number of independently
//! configured [`MetricReader`]s (push or pull) to the live set of instruments,
//! drives per-reader collection on demand and coordinates shutdown and flush
//! across all readers.
//!
//! Every asynchronous boundary in this crate hands back a [`ResultCode`], a
//! one-shot completion token that can be aggregated, waited on with a
//! timeout, or awaited.
//!
//! # Getting started
//!
//! ```
//! use opentelemetry_metrics_core::metrics::{ManualReader, SdkMeterProvider};
//! use opentelemetry_metrics_core::KeyValue;
//! use std::time::Duration;
//!
//! let reader = ManualReader::builder().build();
//! let provider = SdkMeterProvider::builder()
//!     .with_reader(reader.clone())
//!     .build();
//!
//! let meter = provider.meter("my-library");
//! let counter = meter.u64_counter("requests").build();
//! counter.add(1, &[KeyValue::new("route", "/")]);
//!
//! let metrics = reader.collect().expect("collection succeeds");
//! assert_eq!(metrics.scope_metrics.len(), 1);
//!
//! provider.shutdown().join(Duration::from_secs(1));
//! ```
//!
//! [`Meter`]: metrics::Meter
//! [`MetricReader`]: metrics::MetricReader
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]
#![doc(
    html_logo_url = "https://raw.githubusercontent.com/open-telemetry/opentelemetry-rust/main/assets/logo.svg"
)]

#[macro_use]
mod internal_logging;

pub mod clock;
mod common;
pub mod error;
pub mod metrics;
pub mod registry;
pub mod resource;
mod result_code;
#[cfg(any(test, feature = "testing"))]
#[doc(hidden)]
pub mod testing;

pub use clock::{Clock, SystemClock};
pub use common::{InstrumentationScope, InstrumentationScopeBuilder, Key, KeyValue, Value};
pub use resource::Resource;
pub use result_code::{ResultCode, ResultCodeFuture};

#[cfg(feature = "internal-logs")]
#[doc(hidden)]
pub mod _private {
    pub use tracing::{debug, error, info, warn};
}
