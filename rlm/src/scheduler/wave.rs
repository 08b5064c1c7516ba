//! Wave execution

use std::sync::Arc;
use std::time::Duration;

use corpusstore::{AdaptiveChunker, Chunk, Corpus};
use futures::FutureExt;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::SchedulerConfig;
use crate::bridge::{SubcallBridge, SubcallRequest, WaveResult, call_timed};
use crate::error::ReplError;

/// Outcome of one `process` run
#[derive(Debug, Clone, Serialize)]
pub struct ProcessSummary {
    pub total_waves: usize,
    pub processed_waves: usize,
    pub total_chunks: usize,
    pub processed_chunks: usize,
    pub successful_chunks: usize,
    pub failed_chunks: usize,
    pub early_stop: bool,
    /// Results in wave order, completion order within a wave
    pub results: Vec<WaveResult>,
}

/// Dispatches chunks in waves of at most `max_concurrent` sub-calls
pub struct WaveScheduler {
    config: SchedulerConfig,
    bridge: Arc<dyn SubcallBridge>,
    timeout: Duration,
}

impl WaveScheduler {
    pub fn new(config: SchedulerConfig, bridge: Arc<dyn SubcallBridge>, timeout: Duration) -> Result<Self, ReplError> {
        config.validate().map_err(ReplError::InvalidArgument)?;
        Ok(Self { config, bridge, timeout })
    }

    /// Run `query` over `chunks`.
    ///
    /// A wave never starts before every sub-call of the previous wave has
    /// finished. The elapsed time of every dispatched sub-call is fed back
    /// into `chunker`; results that never reached the delegate are not.
    pub async fn process(
        &self,
        corpus: &Corpus,
        chunks: &[Chunk],
        query: &str,
        chunker: &mut AdaptiveChunker,
    ) -> Result<ProcessSummary, ReplError> {
        let wave_size = self.config.max_concurrent;
        let total_waves = chunks.len().div_ceil(wave_size);
        debug!(chunks = chunks.len(), wave_size, total_waves, "WaveScheduler::process: called");

        let mut summary = ProcessSummary {
            total_waves,
            processed_waves: 0,
            total_chunks: chunks.len(),
            processed_chunks: 0,
            successful_chunks: 0,
            failed_chunks: 0,
            early_stop: false,
            results: Vec::with_capacity(chunks.len()),
        };
        let mut confident = 0usize;

        for (wave_index, wave) in chunks.chunks(wave_size).enumerate() {
            info!(wave = wave_index + 1, total_waves, size = wave.len(), "Starting wave");

            let requests = wave
                .iter()
                .map(|chunk| -> Result<SubcallRequest, ReplError> {
                    let text = corpus.peek(chunk.start, chunk.end)?;
                    Ok(SubcallRequest {
                        chunk_id: chunk.id,
                        query: query.to_string(),
                        content: truncate_chars(text, self.config.max_payload_chars).to_string(),
                        timeout: self.timeout,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            let results = self.run_wave(requests).await;

            let mut wave_successes = 0usize;
            for result in results {
                if result.dispatched {
                    chunker.record_processing_time(result.elapsed_ms);
                }
                if result.success {
                    wave_successes += 1;
                    summary.successful_chunks += 1;
                } else {
                    summary.failed_chunks += 1;
                }
                if result.is_confident(self.config.min_confidence) {
                    confident += 1;
                }
                summary.processed_chunks += 1;
                summary.results.push(result);
            }
            summary.processed_waves += 1;

            if wave_successes == 0 {
                warn!(wave = wave_index + 1, "Every sub-call in wave failed");
            }
            debug!(
                wave = wave_index + 1,
                wave_successes,
                confident,
                target_size = chunker.target_size(),
                "WaveScheduler::process: wave complete"
            );

            if confident >= self.config.min_confident_results {
                info!(confident, "Enough confident results, stopping early");
                break;
            }
        }

        summary.early_stop = summary.processed_waves < total_waves;
        info!(
            processed_waves = summary.processed_waves,
            total_waves,
            successful = summary.successful_chunks,
            failed = summary.failed_chunks,
            early_stop = summary.early_stop,
            "Processing complete"
        );
        Ok(summary)
    }

    async fn run_wave(&self, requests: Vec<SubcallRequest>) -> Vec<WaveResult> {
        let mut in_flight: FuturesUnordered<_> = requests
            .into_iter()
            .map(|request| {
                let chunk_id = request.chunk_id;
                let bridge = Arc::clone(&self.bridge);
                tokio::spawn(async move { call_timed(bridge.as_ref(), request).await }).map(move |joined| {
                    joined.unwrap_or_else(|e| {
                        warn!(chunk_id, error = %e, "Sub-call task aborted");
                        WaveResult::not_dispatched(chunk_id, format!("sub-call task failed: {}", e))
                    })
                })
            })
            .collect();

        let mut results = Vec::with_capacity(in_flight.len());
        while let Some(result) = in_flight.next().await {
            debug!(chunk_id = result.chunk_id, success = result.success, "WaveScheduler::run_wave: result");
            results.push(result);
        }
        results
    }
}

/// Longest prefix of `text` holding at most `max_chars` characters
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::DisabledBridge;
    use crate::bridge::mock::{Event, MockBridge};
    use corpusstore::{ChunkerConfig, chunk_content};

    fn fixture(len: usize, target: usize) -> (Corpus, Vec<Chunk>) {
        let corpus = Corpus::from_text("mem", "x".repeat(len));
        let chunks = chunk_content(corpus.content(), target, None).unwrap();
        (corpus, chunks)
    }

    fn chunker() -> AdaptiveChunker {
        AdaptiveChunker::new(&ChunkerConfig {
            initial_size: 1_000,
            min_size: 100,
            max_size: 100_000,
        })
        .unwrap()
    }

    fn scheduler(bridge: Arc<MockBridge>) -> WaveScheduler {
        WaveScheduler::new(SchedulerConfig::default(), bridge, Duration::from_secs(5)).unwrap()
    }

    fn position(events: &[Event], event: Event) -> usize {
        events.iter().position(|e| *e == event).unwrap()
    }

    #[tokio::test]
    async fn test_waves_are_atomic() {
        let bridge = Arc::new(MockBridge::new().with_delay(|id| ((id * 7) % 5) as u64 * 10));
        let (corpus, chunks) = fixture(1_200, 100);
        assert_eq!(chunks.len(), 12);

        let summary = scheduler(bridge.clone())
            .process(&corpus, &chunks, "q", &mut chunker())
            .await
            .unwrap();

        assert_eq!(summary.total_waves, 3);
        assert_eq!(summary.processed_waves, 3);
        assert_eq!(summary.processed_chunks, 12);
        assert!(!summary.early_stop);
        assert!(bridge.peak_in_flight() <= 5);

        let events = bridge.events();
        for (prev, next) in [(0..5, 5..10), (5..10, 10..12)] {
            let last_end = prev.map(|id| position(&events, Event::End(id))).max().unwrap();
            let first_start = next.map(|id| position(&events, Event::Start(id))).min().unwrap();
            assert!(last_end < first_start, "wave overlap in {:?}", events);
        }
    }

    #[tokio::test]
    async fn test_early_stop_after_confident_wave() {
        let bridge = Arc::new(MockBridge::new().confident_on(&[3, 6, 8]));
        let (corpus, chunks) = fixture(2_000, 100);
        assert_eq!(chunks.len(), 20);

        let summary = scheduler(bridge.clone())
            .process(&corpus, &chunks, "q", &mut chunker())
            .await
            .unwrap();

        assert_eq!(summary.total_waves, 4);
        assert_eq!(summary.processed_waves, 2);
        assert_eq!(summary.processed_chunks, 10);
        assert!(summary.early_stop);
        assert_eq!(bridge.call_count(), 10);
        assert_eq!(summary.results.iter().filter(|r| r.is_confident(0.8)).count(), 3);
    }

    #[tokio::test]
    async fn test_confidence_threshold_is_strict() {
        let bridge = Arc::new(MockBridge::new().confident_on(&[0, 1, 2]).with_confidence(0.8));
        let (corpus, chunks) = fixture(1_000, 100);

        let summary = scheduler(bridge)
            .process(&corpus, &chunks, "q", &mut chunker())
            .await
            .unwrap();

        assert_eq!(summary.processed_waves, 2);
        assert!(!summary.early_stop);
    }

    #[tokio::test]
    async fn test_failed_wave_does_not_stop_processing() {
        let bridge = Arc::new(MockBridge::new().failing_on(&[0, 1, 2, 3, 4]));
        let (corpus, chunks) = fixture(1_000, 100);

        let summary = scheduler(bridge)
            .process(&corpus, &chunks, "q", &mut chunker())
            .await
            .unwrap();

        assert_eq!(summary.processed_waves, 2);
        assert_eq!(summary.failed_chunks, 5);
        assert_eq!(summary.successful_chunks, 5);
        assert!(summary.results.iter().filter(|r| !r.success).all(|r| r.chunk_id < 5));
    }

    #[tokio::test]
    async fn test_fast_results_grow_target_size() {
        let bridge = Arc::new(MockBridge::new());
        let (corpus, chunks) = fixture(500, 100);
        let mut chunker = chunker();

        scheduler(bridge).process(&corpus, &chunks, "q", &mut chunker).await.unwrap();

        assert!(chunker.target_size() > 1_000);
        assert_eq!(chunker.controller().stats().adjustments_made, 5);
    }

    #[tokio::test]
    async fn test_undispatched_results_leave_target_size_alone() {
        let (corpus, chunks) = fixture(1_000, 100);
        let mut chunker = chunker();

        let summary = WaveScheduler::new(SchedulerConfig::default(), Arc::new(DisabledBridge), Duration::from_secs(5))
            .unwrap()
            .process(&corpus, &chunks, "q", &mut chunker)
            .await
            .unwrap();

        assert_eq!(summary.failed_chunks, 10);
        assert_eq!(chunker.target_size(), 1_000);
        assert_eq!(chunker.controller().stats().adjustments_made, 0);
    }

    #[tokio::test]
    async fn test_delegate_failures_still_feed_the_controller() {
        let bridge = Arc::new(MockBridge::new().failing_on(&[0, 1, 2, 3, 4]));
        let (corpus, chunks) = fixture(500, 100);
        let mut chunker = chunker();

        scheduler(bridge).process(&corpus, &chunks, "q", &mut chunker).await.unwrap();

        assert_eq!(chunker.controller().stats().adjustments_made, 5);
    }

    #[tokio::test]
    async fn test_payload_is_truncated() {
        let bridge = Arc::new(MockBridge::new());
        let (corpus, chunks) = fixture(20_000, 10_000);
        let config = SchedulerConfig {
            max_payload_chars: 300,
            ..Default::default()
        };

        WaveScheduler::new(config, bridge.clone(), Duration::from_secs(5))
            .unwrap()
            .process(&corpus, &chunks, "q", &mut chunker())
            .await
            .unwrap();

        assert_eq!(bridge.longest_content(), 300);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let config = SchedulerConfig {
            max_concurrent: 0,
            ..Default::default()
        };
        assert!(WaveScheduler::new(config, Arc::new(MockBridge::new()), Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abc", 0), "");
    }
}
