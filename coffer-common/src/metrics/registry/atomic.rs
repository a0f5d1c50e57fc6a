// Copyright 2026 coffer Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{
    borrow::Cow,
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use itertools::Itertools;
use parking_lot::Mutex;

use crate::metrics::{
    BoxedCounter, BoxedCounterVec, BoxedGauge, BoxedGaugeVec, BoxedHistogram, BoxedHistogramVec, Boxer, CounterOps,
    CounterVecOps, GaugeOps, GaugeVecOps, HistogramOps, HistogramVecOps, RegistryOps,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Series {
    name: String,
    labels: Vec<String>,
}

impl Series {
    fn new(name: &str, labels: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        Self {
            name: name.to_string(),
            labels: labels.into_iter().map(|l| l.as_ref().to_string()).collect_vec(),
        }
    }
}

#[derive(Debug, Default)]
struct HistogramCell {
    count: AtomicU64,
    sum: AtomicU64,
}

#[derive(Debug, Clone)]
enum Slot {
    Counter(Arc<AtomicU64>),
    Gauge(Arc<AtomicU64>),
    Histogram(Arc<HistogramCell>),
}

type Slots = Arc<Mutex<HashMap<Series, Slot>>>;

/// In-process metrics registry backed by atomics.
///
/// Every series can be read back with [`AtomicMetricsRegistry::counter`], [`AtomicMetricsRegistry::gauge`] and
/// [`AtomicMetricsRegistry::histogram_count`]. Clones share the same storage, so a clone handed to a cache builder
/// can be inspected from the outside.
#[derive(Debug, Clone, Default)]
pub struct AtomicMetricsRegistry {
    slots: Slots,
}

impl AtomicMetricsRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a counter series, 0 if it was never touched.
    pub fn counter(&self, name: &str, labels: &[&str]) -> u64 {
        match self.slots.lock().get(&Series::new(name, labels)) {
            Some(Slot::Counter(v)) => v.load(Ordering::Relaxed),
            _ => 0,
        }
    }

    /// Current value of a gauge series, 0 if it was never touched.
    pub fn gauge(&self, name: &str, labels: &[&str]) -> u64 {
        match self.slots.lock().get(&Series::new(name, labels)) {
            Some(Slot::Gauge(v)) => v.load(Ordering::Relaxed),
            _ => 0,
        }
    }

    /// Number of samples recorded by a histogram series.
    pub fn histogram_count(&self, name: &str, labels: &[&str]) -> u64 {
        match self.slots.lock().get(&Series::new(name, labels)) {
            Some(Slot::Histogram(v)) => v.count.load(Ordering::Relaxed),
            _ => 0,
        }
    }

    /// Sum of the samples recorded by a histogram series.
    pub fn histogram_sum(&self, name: &str, labels: &[&str]) -> f64 {
        match self.slots.lock().get(&Series::new(name, labels)) {
            Some(Slot::Histogram(v)) => f64::from_bits(v.sum.load(Ordering::Relaxed)),
            _ => 0.0,
        }
    }

    fn slot(&self, series: Series, create: impl FnOnce() -> Slot) -> Slot {
        self.slots.lock().entry(series).or_insert_with(create).clone()
    }
}

#[derive(Debug)]
struct AtomicCounter(Arc<AtomicU64>);

impl CounterOps for AtomicCounter {
    fn increase(&self, val: u64) {
        self.0.fetch_add(val, Ordering::Relaxed);
    }
}

#[derive(Debug)]
struct AtomicGauge(Arc<AtomicU64>);

impl GaugeOps for AtomicGauge {
    fn increase(&self, val: u64) {
        self.0.fetch_add(val, Ordering::Relaxed);
    }

    fn decrease(&self, val: u64) {
        let _ = self
            .0
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| Some(v.saturating_sub(val)));
    }

    fn absolute(&self, val: u64) {
        self.0.store(val, Ordering::Relaxed);
    }
}

#[derive(Debug)]
struct AtomicHistogram(Arc<HistogramCell>);

impl HistogramOps for AtomicHistogram {
    fn record(&self, val: f64) {
        self.0.count.fetch_add(1, Ordering::Relaxed);
        let _ = self.0.sum.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
            Some((f64::from_bits(bits) + val).to_bits())
        });
    }
}

#[derive(Debug)]
struct AtomicVec {
    name: Cow<'static, str>,
    registry: AtomicMetricsRegistry,
}

impl AtomicVec {
    fn series(&self, labels: &[Cow<'static, str>]) -> Series {
        Series::new(&self.name, labels)
    }
}

impl CounterVecOps for AtomicVec {
    fn counter(&self, labels: &[Cow<'static, str>]) -> BoxedCounter {
        match self
            .registry
            .slot(self.series(labels), || Slot::Counter(Arc::default()))
        {
            Slot::Counter(v) => AtomicCounter(v).boxed(),
            _ => unreachable!("series {} is not a counter", self.name),
        }
    }
}

impl GaugeVecOps for AtomicVec {
    fn gauge(&self, labels: &[Cow<'static, str>]) -> BoxedGauge {
        match self.registry.slot(self.series(labels), || Slot::Gauge(Arc::default())) {
            Slot::Gauge(v) => AtomicGauge(v).boxed(),
            _ => unreachable!("series {} is not a gauge", self.name),
        }
    }
}

impl HistogramVecOps for AtomicVec {
    fn histogram(&self, labels: &[Cow<'static, str>]) -> BoxedHistogram {
        match self
            .registry
            .slot(self.series(labels), || Slot::Histogram(Arc::default()))
        {
            Slot::Histogram(v) => AtomicHistogram(v).boxed(),
            _ => unreachable!("series {} is not a histogram", self.name),
        }
    }
}

impl RegistryOps for AtomicMetricsRegistry {
    fn register_counter_vec(
        &self,
        name: Cow<'static, str>,
        _: Cow<'static, str>,
        _: &'static [&'static str],
    ) -> BoxedCounterVec {
        AtomicVec {
            name,
            registry: self.clone(),
        }
        .boxed()
    }

    fn register_gauge_vec(&self, name: Cow<'static, str>, _: Cow<'static, str>, _: &'static [&'static str]) -> BoxedGaugeVec {
        AtomicVec {
            name,
            registry: self.clone(),
        }
        .boxed()
    }

    fn register_histogram_vec(
        &self,
        name: Cow<'static, str>,
        _: Cow<'static, str>,
        _: &'static [&'static str],
    ) -> BoxedHistogramVec {
        AtomicVec {
            name,
            registry: self.clone(),
        }
        .boxed()
    }
}
