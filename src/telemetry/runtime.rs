// SPDX-License-Identifier: MIT
//! Tokio runtime statistics exported as observable gauges.
//!
//! A background task samples the runtime at most once per `min_interval`; the
//! gauges report the latest sample whenever the metric reader collects, so a
//! short export interval never increases the sampling cost.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use opentelemetry::metrics::{Meter, ObservableGauge};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// One reading of the runtime.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RuntimeSample {
    /// Worker threads driving the runtime.
    pub workers: u64,
    /// Tasks spawned and not yet completed.
    pub alive_tasks: u64,
    /// Tasks waiting in the global injection queue.
    pub global_queue_depth: u64,
    /// Seconds since the collector started.
    pub uptime_secs: u64,
}

#[derive(Debug, Default)]
struct SharedSample {
    workers: AtomicU64,
    alive_tasks: AtomicU64,
    global_queue_depth: AtomicU64,
    uptime_secs: AtomicU64,
}

impl SharedSample {
    fn store(&self, handle: &Handle, started: Instant) {
        let metrics = handle.metrics();
        self.workers.store(metrics.num_workers() as u64, Ordering::Relaxed);
        self.alive_tasks
            .store(metrics.num_alive_tasks() as u64, Ordering::Relaxed);
        self.global_queue_depth
            .store(metrics.global_queue_depth() as u64, Ordering::Relaxed);
        self.uptime_secs
            .store(started.elapsed().as_secs(), Ordering::Relaxed);
    }

    fn load(&self) -> RuntimeSample {
        RuntimeSample {
            workers: self.workers.load(Ordering::Relaxed),
            alive_tasks: self.alive_tasks.load(Ordering::Relaxed),
            global_queue_depth: self.global_queue_depth.load(Ordering::Relaxed),
            uptime_secs: self.uptime_secs.load(Ordering::Relaxed),
        }
    }
}

/// Running runtime-statistics collector. Sampling stops when it is dropped.
#[derive(Debug)]
pub struct RuntimeCollector {
    sample: Arc<SharedSample>,
    task: JoinHandle<()>,
    _gauges: Vec<ObservableGauge<u64>>,
}

impl RuntimeCollector {
    /// Start sampling `handle` every `min_interval` and register the gauges on `meter`.
    pub fn start(meter: &Meter, handle: &Handle, min_interval: Duration) -> Self {
        let sample = Arc::new(SharedSample::default());
        let started = Instant::now();
        sample.store(handle, started);

        let task = handle.spawn({
            let sample = Arc::clone(&sample);
            let handle = handle.clone();
            async move {
                let mut ticker = tokio::time::interval(min_interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    sample.store(&handle, started);
                }
            }
        });

        let gauges = vec![
            gauge(meter, &sample, "tokio.runtime.workers", "{thread}", "Worker threads", |s| s.workers),
            gauge(meter, &sample, "tokio.runtime.alive_tasks", "{task}", "Alive tasks", |s| s.alive_tasks),
            gauge(
                meter,
                &sample,
                "tokio.runtime.global_queue_depth",
                "{task}",
                "Tasks in the global queue",
                |s| s.global_queue_depth,
            ),
            gauge(meter, &sample, "process.uptime", "s", "Process uptime", |s| s.uptime_secs),
        ];

        Self {
            sample,
            task,
            _gauges: gauges,
        }
    }

    /// The latest sample.
    pub fn sample(&self) -> RuntimeSample {
        self.sample.load()
    }
}

impl Drop for RuntimeCollector {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn gauge(
    meter: &Meter,
    sample: &Arc<SharedSample>,
    name: &'static str,
    unit: &'static str,
    description: &'static str,
    read: fn(&RuntimeSample) -> u64,
) -> ObservableGauge<u64> {
    let sample = Arc::clone(sample);
    meter
        .u64_observable_gauge(name)
        .with_unit(unit)
        .with_description(description)
        .with_callback(move |observer| observer.observe(read(&sample.load()), &[]))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::metrics::MeterProvider as _;
    use opentelemetry_sdk::metrics::SdkMeterProvider;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn samples_runtime_on_start_and_interval() {
        let provider = SdkMeterProvider::builder().build();
        let meter = provider.meter("runtime-test");
        let collector =
            RuntimeCollector::start(&meter, &Handle::current(), Duration::from_millis(10));

        assert_eq!(collector.sample().workers, 2);

        let parked: Vec<_> = (0..4)
            .map(|_| tokio::spawn(tokio::time::sleep(Duration::from_millis(200))))
            .collect();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(collector.sample().alive_tasks >= 4);

        for task in parked {
            task.await.unwrap();
        }
    }

    #[tokio::test]
    async fn drop_stops_sampling_task() {
        let provider = SdkMeterProvider::builder().build();
        let meter = provider.meter("runtime-test");
        let collector =
            RuntimeCollector::start(&meter, &Handle::current(), Duration::from_millis(10));
        let before = Handle::current().metrics().num_alive_tasks();
        drop(collector);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(Handle::current().metrics().num_alive_tasks() < before);
    }
}
