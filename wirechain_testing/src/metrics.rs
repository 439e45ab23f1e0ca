//! Metric capture through a thread-local debugging recorder.

use metrics_util::debugging::{DebugValue, DebuggingRecorder};

/// Metrics recorded while running a closure.
#[derive(Debug)]
pub struct MetricsCapture {
    values: Vec<(String, Vec<(String, String)>, DebugValue)>,
}

impl MetricsCapture {
    /// Sum of every counter named `name` whose labels include all of
    /// `labels`.
    pub fn counter(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        self.matching(name, labels)
            .filter_map(|value| match value {
                DebugValue::Counter(count) => Some(*count),
                _ => None,
            })
            .sum()
    }

    /// Net value of the gauge named `name`, if it was touched.
    pub fn gauge(&self, name: &str) -> Option<f64> {
        self.matching(name, &[]).find_map(|value| match value {
            DebugValue::Gauge(gauge) => Some(gauge.into_inner()),
            _ => None,
        })
    }

    fn matching<'a>(&'a self, name: &'a str, labels: &'a [(&'a str, &'a str)]) -> impl Iterator<Item = &'a DebugValue> {
        self.values
            .iter()
            .filter(move |(key, key_labels, _)| {
                key == name
                    && labels
                        .iter()
                        .all(|(k, v)| key_labels.iter().any(|(lk, lv)| lk == k && lv == v))
            })
            .map(|(_, _, value)| value)
    }
}

/// Run `f` with a local debugging recorder installed and return what it
/// recorded alongside `f`'s result.
pub fn capture_metrics<T>(f: impl FnOnce() -> T) -> (T, MetricsCapture) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    let out = metrics::with_local_recorder(&recorder, f);
    let values = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(key, _, _, value)| {
            let key = key.key();
            let labels = key
                .labels()
                .map(|label| (label.key().to_owned(), label.value().to_owned()))
                .collect();
            (key.name().to_owned(), labels, value)
        })
        .collect();
    (out, MetricsCapture { values })
}
