//! Metrics registry for the arbiter.
//!
//! Counter/gauge/histogram families with dynamic labels backed by `DashMap`.
//! Label sets are sorted into key vectors so rendering order is stable.
//! Histogram buckets are fixed in milliseconds: arbitrations span producer
//! round trips, not frame dispatch.

use dashmap::DashMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

type LabelKey = Vec<(String, String)>;

fn label_key(labels: &[(&str, &str)]) -> LabelKey {
    let mut key: LabelKey = labels
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    key.sort();
    key
}

fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

fn render_labels(key: &LabelKey) -> String {
    key.iter()
        .map(|(k, v)| format!("{k}=\"{}\"", escape_label(v)))
        .collect::<Vec<_>>()
        .join(",")
}

#[derive(Default)]
pub struct CounterVec {
    map: DashMap<LabelKey, AtomicU64>,
}

impl CounterVec {
    pub fn inc(&self, labels: &[(&str, &str)]) {
        self.add(labels, 1);
    }

    pub fn add(&self, labels: &[(&str, &str)], v: u64) {
        let counter = self
            .map
            .entry(label_key(labels))
            .or_insert_with(|| AtomicU64::new(0));
        counter.fetch_add(v, Ordering::Relaxed);
    }

    /// Current value for an exact label set (0 if never touched).
    pub fn get(&self, labels: &[(&str, &str)]) -> u64 {
        self.map
            .get(&label_key(labels))
            .map_or(0, |c| c.load(Ordering::Relaxed))
    }

    fn render(&self, name: &str, out: &mut String) {
        let _ = writeln!(out, "# TYPE {name} counter");
        for r in self.map.iter() {
            let val = r.value().load(Ordering::Relaxed);
            let _ = writeln!(out, "{name}{{{}}} {val}", render_labels(r.key()));
        }
    }
}

#[derive(Default)]
pub struct GaugeVec {
    map: DashMap<LabelKey, AtomicI64>,
}

impl GaugeVec {
    pub fn inc(&self, labels: &[(&str, &str)]) {
        self.add(labels, 1);
    }

    pub fn dec(&self, labels: &[(&str, &str)]) {
        self.add(labels, -1);
    }

    pub fn add(&self, labels: &[(&str, &str)], v: i64) {
        let gauge = self
            .map
            .entry(label_key(labels))
            .or_insert_with(|| AtomicI64::new(0));
        gauge.fetch_add(v, Ordering::Relaxed);
    }

    pub fn get(&self, labels: &[(&str, &str)]) -> i64 {
        self.map
            .get(&label_key(labels))
            .map_or(0, |g| g.load(Ordering::Relaxed))
    }

    fn render(&self, name: &str, out: &mut String) {
        let _ = writeln!(out, "# TYPE {name} gauge");
        for r in self.map.iter() {
            let val = r.value().load(Ordering::Relaxed);
            let _ = writeln!(out, "{name}{{{}}} {val}", render_labels(r.key()));
        }
    }
}

// 5ms .. 60s
const BUCKETS_MILLIS: [u64; 10] = [5, 10, 50, 100, 250, 500, 1_000, 5_000, 10_000, 60_000];

#[derive(Default)]
struct AtomicHistogram {
    count: AtomicU64,
    sum: AtomicU64,
    buckets: [AtomicU64; 10],
}

#[derive(Default)]
pub struct HistogramVec {
    map: DashMap<LabelKey, AtomicHistogram>,
}

impl HistogramVec {
    /// Observe a duration (cumulative buckets, millisecond scale).
    pub fn observe(&self, labels: &[(&str, &str)], duration: Duration) {
        let hist = self
            .map
            .entry(label_key(labels))
            .or_insert_with(AtomicHistogram::default);
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);

        hist.count.fetch_add(1, Ordering::Relaxed);
        hist.sum.fetch_add(millis, Ordering::Relaxed);
        for (i, &b) in BUCKETS_MILLIS.iter().enumerate() {
            if millis <= b {
                hist.buckets[i].fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn count(&self, labels: &[(&str, &str)]) -> u64 {
        self.map
            .get(&label_key(labels))
            .map_or(0, |h| h.count.load(Ordering::Relaxed))
    }

    fn render(&self, name: &str, out: &mut String) {
        let _ = writeln!(out, "# TYPE {name} histogram");
        for r in self.map.iter() {
            let hist = r.value();
            let label_str = render_labels(r.key());
            let prefix = if label_str.is_empty() {
                String::new()
            } else {
                format!("{label_str},")
            };

            for (i, &le) in BUCKETS_MILLIS.iter().enumerate() {
                let count = hist.buckets[i].load(Ordering::Relaxed);
                let _ = writeln!(out, "{name}_bucket{{{prefix}le=\"{le}\"}} {count}");
            }
            let count = hist.count.load(Ordering::Relaxed);
            let _ = writeln!(out, "{name}_bucket{{{prefix}le=\"+Inf\"}} {count}");
            let sum = hist.sum.load(Ordering::Relaxed);
            let _ = writeln!(out, "{name}_sum{{{label_str}}} {sum}");
            let _ = writeln!(out, "{name}_count{{{label_str}}} {count}");
        }
    }
}

#[derive(Default)]
pub struct ArbiterMetrics {
    /// Terminal decisions by outcome (`decision`).
    pub arbitrations: CounterVec,
    /// Arbitrations currently running.
    pub arbitrations_active: GaugeVec,
    /// Panel verdicts by `decision` and `stage` (primary / joint).
    pub vet_decisions: CounterVec,
    /// Executor attempts by final `status` and `role`.
    pub exec_attempts: CounterVec,
    /// Evaluations short-circuited by the prefilter.
    pub prefilter_skips: CounterVec,
    /// Decode attempts spent by the policy engine.
    pub decode_attempts: CounterVec,
    pub ledger_appends: CounterVec,
    /// Ledger refusals and IO failures by fault code.
    pub ledger_faults: CounterVec,
    pub arbitration_duration: HistogramVec,
    draining: AtomicBool,
}

impl ArbiterMetrics {
    pub fn set_draining(&self) {
        self.draining.store(true, Ordering::Relaxed);
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Relaxed)
    }

    /// Render all families plus caller-supplied gauges.
    pub fn render(&self, extra: &[(&str, u64)]) -> String {
        let mut out = String::new();
        self.arbitrations.render("arbiter_arbitrations_total", &mut out);
        self.arbitrations_active.render("arbiter_arbitrations_active", &mut out);
        self.vet_decisions.render("arbiter_vet_decisions_total", &mut out);
        self.exec_attempts.render("arbiter_exec_attempts_total", &mut out);
        self.prefilter_skips.render("arbiter_prefilter_skips_total", &mut out);
        self.decode_attempts.render("arbiter_decode_attempts_total", &mut out);
        self.ledger_appends.render("arbiter_ledger_appends_total", &mut out);
        self.ledger_faults.render("arbiter_ledger_faults_total", &mut out);
        self.arbitration_duration
            .render("arbiter_arbitration_duration_millis", &mut out);

        let _ = writeln!(
            out,
            "# TYPE arbiter_draining gauge\narbiter_draining {}",
            u8::from(self.is_draining())
        );
        for (k, v) in extra {
            let _ = writeln!(out, "{k} {v}");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_keyed_by_sorted_labels() {
        let m = ArbiterMetrics::default();
        m.arbitrations.inc(&[("decision", "APPROVED")]);
        m.exec_attempts.add(&[("status", "SUCCESS"), ("role", "primary")], 2);
        assert_eq!(m.arbitrations.get(&[("decision", "APPROVED")]), 1);
        assert_eq!(m.exec_attempts.get(&[("role", "primary"), ("status", "SUCCESS")]), 2);
    }

    #[test]
    fn render_includes_histogram_and_draining() {
        let m = ArbiterMetrics::default();
        m.arbitration_duration
            .observe(&[("decision", "FAILED")], Duration::from_millis(42));
        m.set_draining();
        let text = m.render(&[("arbiter_ledger_entries", 7)]);
        assert!(text.contains("arbiter_arbitration_duration_millis_bucket{decision=\"FAILED\",le=\"50\"} 1"));
        assert!(text.contains("arbiter_arbitration_duration_millis_bucket{decision=\"FAILED\",le=\"10\"} 0"));
        assert!(text.contains("arbiter_draining 1"));
        assert!(text.contains("arbiter_ledger_entries 7"));
    }
}
