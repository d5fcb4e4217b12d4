use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Label set of one series, ordered by label name.
pub type Labels = Vec<(String, String)>;

/// A lightweight, thread-safe metrics registry that renders in Prometheus text exposition format.
pub struct MetricsRegistry {
    counters: RwLock<BTreeMap<String, Counter>>,
    gauges: RwLock<BTreeMap<String, GaugeFamily>>,
}

/// Monotonically increasing counter.
pub struct Counter {
    value: AtomicU64,
    help: String,
}

/// Gauge with any number of labelled series.
pub struct GaugeFamily {
    help: String,
    series: BTreeMap<Labels, f64>,
}

// A panic while holding a metrics lock leaves plain numbers behind, which
// are still fine to read and overwrite.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

fn to_labels(labels: &[(&str, &str)]) -> Labels {
    let mut out: Labels = labels
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    out.sort();
    out
}

fn escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            counters: RwLock::new(BTreeMap::new()),
            gauges: RwLock::new(BTreeMap::new()),
        }
    }

    /// Register a counter. If it already exists, this is a no-op.
    pub fn register_counter(&self, name: &str, help: &str) {
        write(&self.counters)
            .entry(name.to_string())
            .or_insert_with(|| Counter {
                value: AtomicU64::new(0),
                help: help.to_string(),
            });
    }

    /// Register a gauge family. If it already exists, this is a no-op.
    pub fn register_gauge(&self, name: &str, help: &str) {
        write(&self.gauges)
            .entry(name.to_string())
            .or_insert_with(|| GaugeFamily {
                help: help.to_string(),
                series: BTreeMap::new(),
            });
    }

    /// Increment a counter by 1.
    pub fn counter_inc(&self, name: &str) {
        self.counter_add(name, 1);
    }

    /// Increment a counter by a given amount.
    pub fn counter_add(&self, name: &str, val: u64) {
        if let Some(c) = read(&self.counters).get(name) {
            c.value.fetch_add(val, Ordering::Relaxed);
        }
    }

    pub fn counter_get(&self, name: &str) -> Option<u64> {
        read(&self.counters)
            .get(name)
            .map(|c| c.value.load(Ordering::Relaxed))
    }

    /// Set one series of a registered gauge.
    pub fn gauge_set(&self, name: &str, labels: &[(&str, &str)], val: f64) {
        if let Some(g) = write(&self.gauges).get_mut(name) {
            g.series.insert(to_labels(labels), val);
        }
    }

    pub fn gauge_get(&self, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
        read(&self.gauges)
            .get(name)?
            .series
            .get(&to_labels(labels))
            .copied()
    }

    /// Drop every series, across all gauges, carrying `label=value`.
    pub fn gauge_remove_matching(&self, label: &str, value: &str) {
        for family in write(&self.gauges).values_mut() {
            family
                .series
                .retain(|labels, _| !labels.iter().any(|(k, v)| k == label && v == value));
        }
    }

    /// Drop series of one gauge for which `keep` is false.
    pub fn gauge_retain(&self, name: &str, keep: impl Fn(&Labels) -> bool) {
        if let Some(g) = write(&self.gauges).get_mut(name) {
            g.series.retain(|labels, _| keep(labels));
        }
    }

    /// Render all metrics in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut output = String::new();

        for (name, counter) in read(&self.counters).iter() {
            output.push_str(&format!("# HELP {} {}\n", name, counter.help));
            output.push_str(&format!("# TYPE {} counter\n", name));
            output.push_str(&format!(
                "{} {}\n",
                name,
                counter.value.load(Ordering::Relaxed)
            ));
        }

        for (name, gauge) in read(&self.gauges).iter() {
            output.push_str(&format!("# HELP {} {}\n", name, gauge.help));
            output.push_str(&format!("# TYPE {} gauge\n", name));
            for (labels, value) in &gauge.series {
                if labels.is_empty() {
                    output.push_str(&format!("{} {}\n", name, value));
                } else {
                    let rendered = labels
                        .iter()
                        .map(|(k, v)| format!("{}=\"{}\"", k, escape(v)))
                        .collect::<Vec<_>>()
                        .join(",");
                    output.push_str(&format!("{}{{{}}} {}\n", name, rendered, value));
                }
            }
        }

        output
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
