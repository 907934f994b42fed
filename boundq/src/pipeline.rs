//! N producers, M consumers, one queue.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeInclusive;
use std::panic;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::backend::{Backend, Strategy};
use crate::driver::{duration_ms, Consumer, ConsumerReport, Producer, ProducerReport};
use crate::error::{Error, Result};
use crate::lock_backend::LockBackend;
use crate::queue::BoundedQueue;
use crate::semaphore_backend::SemaphoreBackend;
use crate::sink::{EventSink, TracingSink};

/// Pipeline settings.
///
/// The defaults reproduce the classic demo: one producer pushing the
/// integers 1 to 10 through a queue of five slots to one consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Queue capacity.
    pub capacity: usize,
    /// Items pushed by each producer.
    pub items: usize,
    pub producers: usize,
    pub consumers: usize,
    pub strategy: Strategy,
    /// Pause after every push, in milliseconds.
    pub produce_delay_ms: u64,
    /// Pause after every pop, in milliseconds.
    pub consume_delay_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            capacity: 5,
            items: 10,
            producers: 1,
            consumers: 1,
            strategy: Strategy::Lock,
            produce_delay_ms: 0,
            consume_delay_ms: 0,
        }
    }
}

impl PipelineConfig {
    /// Checks that the pipeline can run.
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(Error::InvalidCapacity(self.capacity));
        }
        if self.producers == 0 {
            return Err(Error::InvalidConfig("producers must be at least 1".into()));
        }
        if self.consumers == 0 {
            return Err(Error::InvalidConfig("consumers must be at least 1".into()));
        }
        if self.total_items().is_none() {
            return Err(Error::InvalidConfig(format!(
                "{} producers x {} items overflows the item range",
                self.producers, self.items
            )));
        }
        Ok(())
    }

    /// Number of items all producers push together, or `None` if it does not
    /// fit in a `u64`.
    pub fn total_items(&self) -> Option<u64> {
        let items = u64::try_from(self.items).ok()?;
        let producers = u64::try_from(self.producers).ok()?;
        items.checked_mul(producers)
    }

    /// The item sequence of every producer.
    ///
    /// Producer `p` pushes `p * items + 1 ..= (p + 1) * items`, so all items
    /// are distinct and a single producer pushes `1..=items`. The ranges are
    /// lazy; nothing is materialized until a producer pushes it.
    ///
    /// Only meaningful for a config that passed [`validate`](Self::validate).
    pub fn sources(&self) -> Vec<RangeInclusive<u64>> {
        let items = self.items as u64;
        (0..self.producers as u64)
            .map(|p| p * items + 1..=(p + 1) * items)
            .collect()
    }
}

/// What a pipeline run delivered.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport<T = u64> {
    pub strategy: Strategy,
    pub capacity: usize,
    pub producers: Vec<ProducerReport>,
    pub consumers: Vec<ConsumerReport>,
    /// Items received by each consumer, in the order it popped them.
    pub delivered: Vec<Vec<T>>,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
}

impl<T> PipelineReport<T> {
    /// Total number of items popped by all consumers.
    pub fn total_delivered(&self) -> usize {
        self.delivered.iter().map(Vec::len).sum()
    }
}

impl<T: Ord + Clone + fmt::Debug> PipelineReport<T> {
    /// Checks the delivery against the producer sources.
    ///
    /// Every produced item must be delivered exactly once, and each
    /// consumer must see any one producer's items in production order.
    /// Items across all sources must be distinct.
    pub fn verify<S>(&self, sources: &[S]) -> Result<()>
    where
        S: Clone + IntoIterator<Item = T>,
    {
        let mut origin = BTreeMap::new();
        for (p, source) in sources.iter().enumerate() {
            for (seq, item) in source.clone().into_iter().enumerate() {
                if origin.contains_key(&item) {
                    return Err(Error::Delivery(format!("duplicate source item {:?}", item)));
                }
                origin.insert(item, (p, seq));
            }
        }

        let mut seen = BTreeMap::new();
        for (c, items) in self.delivered.iter().enumerate() {
            let mut last_seq: Vec<Option<usize>> = vec![None; sources.len()];
            for item in items {
                let Some(&(p, seq)) = origin.get(item) else {
                    return Err(Error::Delivery(format!(
                        "consumer {} received unknown item {:?}",
                        c, item
                    )));
                };
                if let Some(prev) = seen.insert(item.clone(), c) {
                    return Err(Error::Delivery(format!(
                        "item {:?} delivered to consumers {} and {}",
                        item, prev, c
                    )));
                }
                if last_seq[p].is_some_and(|last| last > seq) {
                    return Err(Error::Delivery(format!(
                        "consumer {} received {:?} out of order",
                        c, item
                    )));
                }
                last_seq[p] = Some(seq);
            }
        }

        if seen.len() != origin.len() {
            let missing: Vec<_> = origin.keys().filter(|k| !seen.contains_key(*k)).collect();
            return Err(Error::Delivery(format!("lost items {:?}", missing)));
        }
        Ok(())
    }
}

/// Closes the queue when a consumer thread unwinds, so producers blocked on
/// a full queue are released instead of waiting forever.
struct CloseOnPanic<T, B: Backend<T>>(BoundedQueue<T, B>);

impl<T, B: Backend<T>> Drop for CloseOnPanic<T, B> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.close();
        }
    }
}

/// Runs producers and consumers over one queue on scoped threads.
///
/// Consumers start first and drain until end of stream. A single producer
/// closes the queue itself after its last item; with several producers
/// the pipeline closes the queue once all of them have finished.
pub struct Pipeline {
    config: PipelineConfig,
    sink: Arc<dyn EventSink>,
}

impl Pipeline {
    /// Creates a pipeline after validating `config`.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Pipeline {
            config,
            sink: Arc::new(TracingSink),
        })
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs the configured item sources with the configured strategy.
    pub fn run(&self) -> Result<PipelineReport<u64>> {
        let sources = self.config.sources();
        match self.config.strategy {
            Strategy::Lock => self.run_sources::<u64, LockBackend<u64>, _>(sources),
            Strategy::Semaphore => self.run_sources::<u64, SemaphoreBackend<u64>, _>(sources),
        }
    }

    /// Runs one producer per source with backend `B`.
    ///
    /// The configured `producers` and `items` are ignored; the number of
    /// sources decides the producer count.
    pub fn run_sources<T, B, I>(&self, sources: Vec<I>) -> Result<PipelineReport<T>>
    where
        T: fmt::Debug + Send,
        B: Backend<T>,
        I: IntoIterator<Item = T> + Send,
    {
        if sources.is_empty() {
            return Err(Error::InvalidConfig("at least one source is required".into()));
        }

        let cfg = &self.config;
        let queue = BoundedQueue::<T, B>::try_new(cfg.capacity)?;
        let single_producer = sources.len() == 1;
        let start = Instant::now();

        info!(
            strategy = %cfg.strategy,
            capacity = cfg.capacity,
            producers = sources.len(),
            consumers = cfg.consumers,
            "pipeline starting"
        );

        let (producer_results, consumer_results) = thread::scope(|s| {
            let consumers: Vec<_> = (0..cfg.consumers)
                .map(|i| {
                    let mut consumer = Consumer::new(format!("consumer-{}", i), queue.clone())
                        .with_sink(Arc::clone(&self.sink))
                        .with_delay(Duration::from_millis(cfg.consume_delay_ms));
                    let guard = CloseOnPanic(queue.clone());
                    s.spawn(move || {
                        let _guard = guard;
                        consumer.collect()
                    })
                })
                .collect();

            let producers: Vec<_> = sources
                .into_iter()
                .enumerate()
                .map(|(i, source)| {
                    let mut producer = Producer::new(format!("producer-{}", i), queue.clone())
                        .with_sink(Arc::clone(&self.sink))
                        .with_delay(Duration::from_millis(cfg.produce_delay_ms))
                        .close_when_done(single_producer);
                    s.spawn(move || producer.run(source))
                })
                .collect();

            let producer_results: Vec<_> = producers.into_iter().map(|h| h.join()).collect();
            // Every producer is done (or gone): nothing else will be pushed.
            queue.close();
            let consumer_results: Vec<_> = consumers.into_iter().map(|h| h.join()).collect();
            (producer_results, consumer_results)
        });

        // Consumer panics first: a dead consumer closes the queue early, which
        // is the only way a producer here can be refused.
        let mut consumers = Vec::with_capacity(consumer_results.len());
        let mut delivered = Vec::with_capacity(consumer_results.len());
        for result in consumer_results {
            let (report, items) = result.unwrap_or_else(|e| panic::resume_unwind(e));
            consumers.push(report);
            delivered.push(items);
        }

        let mut producers = Vec::with_capacity(producer_results.len());
        for (i, result) in producer_results.into_iter().enumerate() {
            match result.unwrap_or_else(|e| panic::resume_unwind(e)) {
                Ok(report) => producers.push(report),
                Err(_) => {
                    return Err(Error::PushAfterClose {
                        producer: format!("producer-{}", i),
                        pushed: producers.iter().map(|p| p.pushed).sum(),
                    });
                }
            }
        }

        let report = PipelineReport {
            strategy: cfg.strategy,
            capacity: cfg.capacity,
            producers,
            consumers,
            delivered,
            elapsed: start.elapsed(),
        };
        info!(
            delivered = report.total_delivered(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "pipeline finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{EventKind, RecordingSink};

    #[test]
    fn test_default_config_matches_demo() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.capacity, 5);
        assert_eq!(cfg.sources(), vec![1..=10]);
        assert_eq!(cfg.total_items(), Some(10));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_sources_are_disjoint() {
        let cfg = PipelineConfig {
            producers: 3,
            items: 4,
            ..Default::default()
        };
        let sources = cfg.sources();
        assert_eq!(sources, vec![1..=4, 5..=8, 9..=12]);
        assert_eq!(sources[1].clone().collect::<Vec<_>>(), vec![5, 6, 7, 8]);
    }

    #[test]
    fn test_validate_rejects_item_overflow() {
        let cfg = PipelineConfig {
            producers: 2,
            items: usize::MAX / 2 + 1,
            ..Default::default()
        };
        assert_eq!(cfg.total_items(), None);
        assert!(matches!(cfg.validate(), Err(Error::InvalidConfig(_))));
        assert!(Pipeline::new(cfg).is_err());
    }

    #[test]
    fn test_large_sources_are_lazy() {
        let cfg = PipelineConfig {
            producers: 2,
            items: usize::MAX / 2,
            ..Default::default()
        };
        assert!(cfg.validate().is_ok());

        let items = (usize::MAX / 2) as u64;
        let sources = cfg.sources();
        assert_eq!(sources[0], 1..=items);
        assert_eq!(sources[1], items + 1..=2 * items);
    }

    #[test]
    fn test_zero_items() {
        let cfg = PipelineConfig {
            producers: 3,
            items: 0,
            ..Default::default()
        };
        let report = Pipeline::new(cfg.clone()).unwrap().run().unwrap();
        assert_eq!(report.total_delivered(), 0);
        report.verify(&cfg.sources()).unwrap();
    }

    #[test]
    fn test_validate() {
        let cfg = PipelineConfig {
            capacity: 0,
            ..Default::default()
        };
        assert_eq!(cfg.validate(), Err(Error::InvalidCapacity(0)));

        let cfg = PipelineConfig {
            consumers: 0,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(Error::InvalidConfig(_))));
        assert!(Pipeline::new(cfg).is_err());
    }

    #[test]
    fn test_config_partial_json_uses_defaults() {
        let cfg: PipelineConfig =
            serde_json::from_str(r#"{"capacity": 2, "strategy": "semaphore"}"#).unwrap();
        assert_eq!(cfg.capacity, 2);
        assert_eq!(cfg.strategy, Strategy::Semaphore);
        assert_eq!(cfg.items, 10);
        assert_eq!(cfg.consumers, 1);
    }

    #[test]
    fn test_run_both_strategies() {
        for strategy in Strategy::ALL {
            let cfg = PipelineConfig {
                strategy,
                producers: 2,
                consumers: 3,
                items: 50,
                capacity: 3,
                ..Default::default()
            };
            let pipeline = Pipeline::new(cfg.clone()).unwrap();
            let report = pipeline.run().unwrap();
            assert_eq!(report.strategy, strategy);
            assert_eq!(report.total_delivered(), 100);
            report.verify(&cfg.sources()).unwrap();
            assert!(report.consumers.iter().all(|c| c.end_of_stream));
            assert!(report.producers.iter().all(|p| !p.closed));
        }
    }

    #[test]
    fn test_single_producer_closes_queue() {
        let sink = Arc::new(RecordingSink::new());
        let pipeline = Pipeline::new(PipelineConfig::default())
            .unwrap()
            .with_sink(sink.clone());
        let report = pipeline.run().unwrap();

        assert!(report.producers[0].closed);
        assert_eq!(report.delivered, vec![(1..=10).collect::<Vec<u64>>()]);
        assert_eq!(sink.count(EventKind::Closed), 1);
        assert_eq!(sink.count(EventKind::Consumed), 10);
    }

    #[test]
    fn test_verify_detects_problems() {
        let sources = vec![vec![1u64, 2, 3]];
        let mut report = PipelineReport {
            strategy: Strategy::Lock,
            capacity: 1,
            producers: Vec::new(),
            consumers: Vec::new(),
            delivered: vec![vec![1, 2, 3]],
            elapsed: Duration::ZERO,
        };
        assert!(report.verify(&sources).is_ok());

        report.delivered = vec![vec![1, 3, 2]];
        assert!(matches!(report.verify(&sources), Err(Error::Delivery(_))));

        report.delivered = vec![vec![1, 2], vec![2, 3]];
        assert!(matches!(report.verify(&sources), Err(Error::Delivery(_))));

        report.delivered = vec![vec![1, 2]];
        assert!(matches!(report.verify(&sources), Err(Error::Delivery(_))));

        report.delivered = vec![vec![1, 2, 3, 4]];
        assert!(matches!(report.verify(&sources), Err(Error::Delivery(_))));
    }

    #[test]
    fn test_run_sources_with_strings() {
        let pipeline = Pipeline::new(PipelineConfig {
            capacity: 1,
            consumers: 2,
            ..Default::default()
        })
        .unwrap();
        let sources = vec![
            vec!["a".to_string(), "b".to_string()],
            vec!["c".to_string(), "d".to_string()],
        ];
        let report = pipeline
            .run_sources::<String, SemaphoreBackend<String>, _>(sources.clone())
            .unwrap();
        report.verify(&sources).unwrap();
    }

    /// Panics the first time a consumer reports an item.
    struct PanicOnConsume;

    impl EventSink for PanicOnConsume {
        fn record(&self, kind: EventKind, _driver: &str, _item: &dyn fmt::Debug) {
            if kind == EventKind::Consumed {
                panic!("consumer failed");
            }
        }
    }

    #[test]
    fn test_consumer_panic_releases_blocked_producers() {
        for strategy in Strategy::ALL {
            let pipeline = Pipeline::new(PipelineConfig {
                capacity: 1,
                items: 100,
                producers: 2,
                strategy,
                ..Default::default()
            })
            .unwrap()
            .with_sink(Arc::new(PanicOnConsume));

            // Producers fill the queue and block; the dying consumer must
            // close it so the run unwinds instead of hanging.
            let res = panic::catch_unwind(panic::AssertUnwindSafe(|| pipeline.run()));
            let payload = res.unwrap_err();
            assert_eq!(payload.downcast_ref::<&str>(), Some(&"consumer failed"));
        }
    }

    #[test]
    fn test_run_sources_requires_a_source() {
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        let res = pipeline.run_sources::<u64, LockBackend<u64>, Vec<u64>>(Vec::new());
        assert!(matches!(res, Err(Error::InvalidConfig(_))));
    }
}
