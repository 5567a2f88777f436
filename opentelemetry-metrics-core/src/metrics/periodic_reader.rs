use std::{
    env, fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, Sender},
        Arc, Mutex, PoisonError,
    },
    thread,
    time::{Duration, Instant},
};

use crate::{
    error::{OTelSdkError, OTelSdkResult},
    ResultCode,
};

use super::{
    exporter::PushMetricExporter,
    instrument::InstrumentKind,
    reader::{MetricProducer, MetricReader},
    Temporality,
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

const METRIC_EXPORT_INTERVAL_NAME: &str = "OTEL_METRIC_EXPORT_INTERVAL";
const METRIC_EXPORT_TIMEOUT_NAME: &str = "OTEL_METRIC_EXPORT_TIMEOUT";

/// Configuration options for [PeriodicReader].
///
/// A periodic reader is a [MetricReader] that collects and exports metric data
/// to the exporter at a defined interval.
///
/// By default, the returned [MetricReader] will collect and export data every
/// 60 seconds, and wait at most 30 seconds for each export to complete. The
/// export time is not counted towards the interval between attempts.
#[derive(Debug)]
pub struct PeriodicReaderBuilder<E> {
    interval: Duration,
    timeout: Duration,
    exporter: E,
}

impl<E> PeriodicReaderBuilder<E>
where
    E: PushMetricExporter,
{
    fn new(exporter: E) -> Self {
        PeriodicReaderBuilder {
            interval: duration_from_env(METRIC_EXPORT_INTERVAL_NAME).unwrap_or(DEFAULT_INTERVAL),
            timeout: duration_from_env(METRIC_EXPORT_TIMEOUT_NAME).unwrap_or(DEFAULT_TIMEOUT),
            exporter,
        }
    }

    /// Configures the intervening time between exports for a [PeriodicReader].
    ///
    /// This option overrides any value set for the `OTEL_METRIC_EXPORT_INTERVAL`
    /// environment variable.
    ///
    /// If this option is not used or `interval` is equal to zero, 60 seconds is
    /// used as the default.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        if !interval.is_zero() {
            self.interval = interval;
        }
        self
    }

    /// Configures how long the reader waits for an export to complete.
    ///
    /// An export still running when the timeout elapses is abandoned and
    /// reported as [OTelSdkError::Timeout]; it is not cancelled.
    ///
    /// This option overrides any value set for the `OTEL_METRIC_EXPORT_TIMEOUT`
    /// environment variable.
    ///
    /// If this option is not used or `timeout` is equal to zero, 30 seconds is used
    /// as the default.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        if !timeout.is_zero() {
            self.timeout = timeout;
        }
        self
    }

    /// Create a [PeriodicReader] with the given config.
    pub fn build(self) -> PeriodicReader {
        PeriodicReader::new(self.exporter, self.interval, self.timeout)
    }
}

fn duration_from_env(name: &str) -> Option<Duration> {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|millis| *millis > 0)
        .map(Duration::from_millis)
}

/// A [MetricReader] that continuously collects and exports metric data at a set
/// interval.
///
/// Collection and export happen on a dedicated background thread. Calls to
/// [`force_flush`](MetricReader::force_flush) and
/// [`shutdown`](MetricReader::shutdown) are handed to that thread and return
/// right away; the returned [ResultCode] completes once the thread is done.
///
/// # Example
///
/// ```no_run
/// use opentelemetry_metrics_core::metrics::{InMemoryMetricExporter, PeriodicReader};
/// use std::time::Duration;
///
/// let exporter = InMemoryMetricExporter::default();
/// let reader = PeriodicReader::builder(exporter)
///     .with_interval(Duration::from_secs(10))
///     .build();
/// # drop(reader);
/// ```
#[derive(Clone)]
pub struct PeriodicReader {
    inner: Arc<PeriodicReaderInner>,
}

struct PeriodicReaderInner {
    exporter: Arc<dyn PushMetricExporter>,
    producer: Arc<Mutex<Option<Arc<dyn MetricProducer>>>>,
    message_sender: Mutex<Sender<Message>>,
    is_shutdown: AtomicBool,
}

#[derive(Debug)]
enum Message {
    Flush(ResultCode),
    Shutdown(ResultCode),
}

impl PeriodicReader {
    /// Configuration options for a periodic reader
    pub fn builder<E>(exporter: E) -> PeriodicReaderBuilder<E>
    where
        E: PushMetricExporter,
    {
        PeriodicReaderBuilder::new(exporter)
    }

    fn new<E>(exporter: E, interval: Duration, timeout: Duration) -> Self
    where
        E: PushMetricExporter,
    {
        let (message_sender, message_receiver): (Sender<Message>, Receiver<Message>) =
            mpsc::channel();
        let exporter: Arc<dyn PushMetricExporter> = Arc::new(exporter);
        let producer = Arc::new(Mutex::new(None));

        // The worker does not hold the sender, so dropping every reader handle
        // disconnects the channel and stops the thread.
        let worker = Worker {
            exporter: Arc::clone(&exporter),
            producer: Arc::clone(&producer),
            timeout,
        };
        let result_thread_creation = thread::Builder::new()
            .name("OpenTelemetry.Metrics.PeriodicReader".to_string())
            .spawn(move || worker.run(message_receiver, interval));

        if let Err(e) = result_thread_creation {
            otel_error!(
                name: "PeriodicReader.ThreadStartError",
                message = "Failed to start the export thread, metrics will not be exported.",
                error = format!("{:?}", e)
            );
        }

        PeriodicReader {
            inner: Arc::new(PeriodicReaderInner {
                exporter,
                producer,
                message_sender: Mutex::new(message_sender),
                is_shutdown: AtomicBool::new(false),
            }),
        }
    }

    fn send(&self, message: Message) -> Result<(), Message> {
        self.inner
            .message_sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .send(message)
            .map_err(|err| err.0)
    }
}

impl fmt::Debug for PeriodicReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeriodicReader")
            .field("exporter", &self.inner.exporter)
            .field("is_shutdown", &self.inner.is_shutdown.load(Ordering::Relaxed))
            .finish()
    }
}

impl MetricReader for PeriodicReader {
    fn register_producer(&self, producer: Box<dyn MetricProducer>) {
        let mut slot = self
            .inner
            .producer
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(Arc::from(producer));
        } else {
            otel_warn!(
                name: "PeriodicReader.DuplicateRegistration",
                message = "The reader is already registered with a provider, ignoring the new registration."
            );
        }
    }

    fn force_flush(&self) -> ResultCode {
        if self.inner.is_shutdown.load(Ordering::Acquire) {
            return ResultCode::of_exceptional_failure(OTelSdkError::AlreadyShutdown);
        }
        let code = ResultCode::new();
        if self.send(Message::Flush(code.clone())).is_err() {
            otel_warn!(
                name: "PeriodicReader.ForceFlushError",
                message = "The export thread is not running."
            );
            code.fail_with(OTelSdkError::InternalFailure(
                "export thread is not running".into(),
            ));
        }
        code
    }

    fn shutdown(&self) -> ResultCode {
        if self
            .inner
            .is_shutdown
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return ResultCode::of_exceptional_failure(OTelSdkError::AlreadyShutdown);
        }
        let code = ResultCode::new();
        if self.send(Message::Shutdown(code.clone())).is_err() {
            // Without the thread there is nothing to export, but the exporter
            // still gets released.
            otel_warn!(
                name: "PeriodicReader.ShutdownWithoutThread",
                message = "The export thread is not running, shutting the exporter down directly."
            );
            self.inner.exporter.shutdown().forward_to(&code);
        }
        code
    }

    fn temporality(&self, kind: InstrumentKind) -> Temporality {
        self.inner.exporter.temporality(kind)
    }
}

/// State owned by the export thread.
struct Worker {
    exporter: Arc<dyn PushMetricExporter>,
    producer: Arc<Mutex<Option<Arc<dyn MetricProducer>>>>,
    timeout: Duration,
}

impl Worker {
    fn run(self, messages: Receiver<Message>, interval: Duration) {
        let mut interval_start = Instant::now();
        let mut remaining_interval = interval;
        otel_info!(
            name: "PeriodicReader.ThreadStarted",
            interval_in_millisecs = interval.as_millis(),
            timeout_in_millisecs = self.timeout.as_millis()
        );
        loop {
            match messages.recv_timeout(remaining_interval) {
                Ok(Message::Flush(code)) => {
                    otel_debug!(name: "PeriodicReader.ExportingDueToFlush");
                    let exported = ResultCode::from(self.collect_and_export());
                    ResultCode::of_all([exported, self.exporter.force_flush()]).forward_to(&code);

                    // Adjust the remaining interval after the flush
                    let elapsed = interval_start.elapsed();
                    if elapsed < interval {
                        remaining_interval = interval - elapsed;
                    } else {
                        // The flush ran past the scheduled export, so export
                        // again right away.
                        interval_start = Instant::now();
                        remaining_interval = Duration::ZERO;
                    }
                }
                Ok(Message::Shutdown(code)) => {
                    // Perform final export and break out of loop and exit the thread
                    otel_debug!(name: "PeriodicReader.ExportingDueToShutdown");
                    let exported = ResultCode::from(self.collect_and_export());
                    ResultCode::of_all([exported, self.exporter.shutdown()]).forward_to(&code);
                    break;
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    let export_start = Instant::now();
                    otel_debug!(name: "PeriodicReader.ExportingDueToTimer");
                    // Failures are already logged by collect_and_export.
                    let _ = self.collect_and_export();

                    let time_taken_for_export = export_start.elapsed();
                    if time_taken_for_export > interval {
                        otel_debug!(name: "PeriodicReader.ExportTookLongerThanInterval");
                        remaining_interval = Duration::ZERO;
                    } else {
                        remaining_interval = interval - time_taken_for_export;
                    }
                    interval_start = Instant::now();
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    otel_debug!(
                        name: "PeriodicReader.Disconnected",
                        message = "Every reader handle was dropped, stopping the export thread."
                    );
                    break;
                }
            }
        }
        otel_info!(name: "PeriodicReader.ThreadStopped");
    }

    fn collect_and_export(&self) -> OTelSdkResult {
        let producer = self
            .producer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(producer) = producer else {
            otel_debug!(
                name: "PeriodicReader.NotRegistered",
                message = "No producer registered yet, skipping export."
            );
            return Ok(());
        };

        let metrics = producer.produce().map_err(|err| {
            otel_warn!(
                name: "PeriodicReader.CollectError",
                error = format!("{}", err)
            );
            OTelSdkError::InternalFailure(err.to_string())
        })?;
        if metrics.scope_metrics.is_empty() {
            otel_debug!(name: "PeriodicReader.NoMetricsCollected");
            return Ok(());
        }

        let result = match self.exporter.export(&metrics).join(self.timeout).result() {
            Some(result) => result,
            None => Err(OTelSdkError::Timeout(self.timeout)),
        };
        if let Err(err) = &result {
            otel_warn!(
                name: "PeriodicReader.ExportError",
                error = format!("{}", err)
            );
        }
        result
    }
}
