//! Per-subject message metrics.
//!
//! Recorded through the [`metrics`] facade; nothing is exported unless the
//! process installs a recorder.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `micro_messages_total` | counter | `subject` |
//! | `micro_request_duration_seconds` | histogram | `subject` |
//! | `micro_payload_size_bytes` | histogram | `subject` |

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};

use crate::chain::Middleware;
use crate::handler::{BoxFuture, Handler};
use crate::transport::Message;

pub const MESSAGES_TOTAL: &str = "micro_messages_total";
pub const REQUEST_DURATION_SECONDS: &str = "micro_request_duration_seconds";
pub const PAYLOAD_SIZE_BYTES: &str = "micro_payload_size_bytes";

/// Counts messages and records handling time and payload size.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsMiddleware;

impl MetricsMiddleware {
    pub fn new() -> Self {
        Self
    }

    /// Register metric descriptions with the installed recorder.
    pub fn describe() {
        describe_counter!(MESSAGES_TOTAL, "Total number of messages received.");
        describe_histogram!(
            REQUEST_DURATION_SECONDS,
            Unit::Seconds,
            "Duration of message handling in seconds."
        );
        describe_histogram!(
            PAYLOAD_SIZE_BYTES,
            Unit::Bytes,
            "Size of request payloads in bytes."
        );
    }
}

impl Middleware<Handler> for MetricsMiddleware {
    fn wrap(&self, next: Handler) -> Handler {
        Arc::new(move |msg: Message| -> BoxFuture<'static, ()> {
            let next = next.clone();
            Box::pin(async move {
                let subject = msg.subject().to_string();
                let size = msg.data().len();
                counter!(MESSAGES_TOTAL, "subject" => subject.clone()).increment(1);

                let start = Instant::now();
                next(msg).await;
                let elapsed = start.elapsed();

                histogram!(REQUEST_DURATION_SECONDS, "subject" => subject.clone())
                    .record(elapsed.as_secs_f64());
                histogram!(PAYLOAD_SIZE_BYTES, "subject" => subject).record(size as f64);
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use bytes::Bytes;
    use metrics::{
        Counter, CounterFn, Gauge, Histogram, HistogramFn, Key, KeyName, Metadata, Recorder,
        SharedString,
    };
    use micromw_core::Headers;

    use crate::handler::handler_fn;
    use crate::transport::memory::test_message;

    // Records every counter increment and histogram value by metric name and
    // subject label.
    #[derive(Default)]
    struct CaptureRecorder {
        counters: Arc<Mutex<HashMap<(String, String), u64>>>,
        histograms: Arc<Mutex<HashMap<(String, String), Vec<f64>>>>,
    }

    struct Captured {
        key: (String, String),
        counters: Arc<Mutex<HashMap<(String, String), u64>>>,
        histograms: Arc<Mutex<HashMap<(String, String), Vec<f64>>>>,
    }

    impl CounterFn for Captured {
        fn increment(&self, value: u64) {
            *self.counters.lock().unwrap().entry(self.key.clone()).or_default() += value;
        }

        fn absolute(&self, value: u64) {
            self.counters.lock().unwrap().insert(self.key.clone(), value);
        }
    }

    impl HistogramFn for Captured {
        fn record(&self, value: f64) {
            self.histograms
                .lock()
                .unwrap()
                .entry(self.key.clone())
                .or_default()
                .push(value);
        }
    }

    impl CaptureRecorder {
        fn captured(&self, key: &Key) -> Arc<Captured> {
            let subject = key
                .labels()
                .find(|label| label.key() == "subject")
                .map(|label| label.value().to_string())
                .unwrap_or_default();
            Arc::new(Captured {
                key: (key.name().to_string(), subject),
                counters: self.counters.clone(),
                histograms: self.histograms.clone(),
            })
        }
    }

    impl Recorder for CaptureRecorder {
        fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
        fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
        fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

        fn register_counter(&self, key: &Key, _: &Metadata<'_>) -> Counter {
            Counter::from_arc(self.captured(key))
        }

        fn register_gauge(&self, _: &Key, _: &Metadata<'_>) -> Gauge {
            Gauge::noop()
        }

        fn register_histogram(&self, key: &Key, _: &Metadata<'_>) -> Histogram {
            Histogram::from_arc(self.captured(key))
        }
    }

    #[test]
    fn test_records_per_subject() {
        let recorder = CaptureRecorder::default();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();

        let echo = handler_fn(|msg: Message| async move {
            let _ = msg.respond(msg.data().clone(), Headers::new());
        });
        let handler = MetricsMiddleware::new().wrap(echo);

        // The local recorder is thread-bound; block_on polls on this thread.
        metrics::with_local_recorder(&recorder, || {
            MetricsMiddleware::describe();
            runtime.block_on(async {
                for (subject, size) in [("a", 3), ("a", 5), ("b", 7)] {
                    let (msg, rx) = test_message(subject, Bytes::from(vec![0u8; size]));
                    handler(msg).await;
                    assert_eq!(rx.await.unwrap().data.len(), size);
                }
            });
        });

        let key = |name: &str, subject: &str| (name.to_string(), subject.to_string());
        let counters = recorder.counters.lock().unwrap();
        assert_eq!(counters[&key(MESSAGES_TOTAL, "a")], 2);
        assert_eq!(counters[&key(MESSAGES_TOTAL, "b")], 1);

        let histograms = recorder.histograms.lock().unwrap();
        assert_eq!(histograms[&key(PAYLOAD_SIZE_BYTES, "a")], [3.0, 5.0]);
        assert_eq!(histograms[&key(PAYLOAD_SIZE_BYTES, "b")], [7.0]);
        assert_eq!(histograms[&key(REQUEST_DURATION_SECONDS, "a")].len(), 2);
    }

    #[tokio::test]
    async fn test_without_recorder_is_transparent() {
        let echo = handler_fn(|msg: Message| async move {
            let _ = msg.respond(msg.data().clone(), Headers::new());
        });
        let handler = MetricsMiddleware.wrap(echo);

        let (msg, rx) = test_message("s", Bytes::from("data"));
        handler(msg).await;
        assert_eq!(rx.await.unwrap().data, Bytes::from("data"));
    }
}
