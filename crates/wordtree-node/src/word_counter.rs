use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tracing::debug;
use wordtree_common::TransportConfig;

use crate::pipeline::{Processor, Task, TaskFactory};

/// Word → number of occurrences in one fragment.
pub type WordCount = HashMap<String, usize>;

/// Counts every word of `words` in one pass.
///
/// ```
/// use wordtree_node::count_words;
///
/// let words = vec!["a".to_string(), "b".to_string(), "a".to_string()];
/// let counts = count_words(&words);
/// assert_eq!(counts["a"], 2);
/// assert_eq!(counts["b"], 1);
/// ```
pub fn count_words(words: &[String]) -> WordCount {
    let mut counts = WordCount::with_capacity(words.len());
    for word in words {
        *counts.entry(word.clone()).or_insert(0) += 1;
    }
    counts
}

pub struct CountTask {
    words: Vec<String>,
    results: mpsc::UnboundedSender<WordCount>,
}

impl Task for CountTask {
    fn execute(self) {
        let counts = count_words(&self.words);
        debug!(
            "Counted {} words, {} distinct",
            self.words.len(),
            counts.len()
        );
        // The counter owns the receiving end for its whole life
        let _ = self.results.send(counts);
    }
}

pub struct CountingFactory {
    results: mpsc::UnboundedSender<WordCount>,
}

impl TaskFactory for CountingFactory {
    type Input = Vec<String>;
    type Task = CountTask;

    fn new_task(&self, words: Vec<String>) -> CountTask {
        CountTask {
            words,
            results: self.results.clone(),
        }
    }
}

/// Pooled local word counting.
///
/// Each submitted fragment is counted independently on the processor pool
/// and its result is queued as-is; results of different fragments are never
/// merged.
pub struct WordCounter {
    processor: Processor<CountingFactory>,
    results: Mutex<mpsc::UnboundedReceiver<WordCount>>,
    poll_timeout: Duration,
}

impl WordCounter {
    /// Starts the counter. Must be called from within a tokio runtime.
    pub fn spawn(config: &TransportConfig) -> Self {
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        let processor = Processor::spawn(CountingFactory { results: results_tx }, config);

        Self {
            processor,
            results: Mutex::new(results_rx),
            poll_timeout: config.poll_timeout,
        }
    }

    /// Queues a fragment for counting. Empty fragments are ignored.
    ///
    /// Returns whether the fragment was queued.
    pub fn submit(&self, words: Vec<String>) -> bool {
        if words.is_empty() {
            return false;
        }
        self.processor.submit(Some(words))
    }

    /// Takes the oldest finished result, waiting up to the poll timeout.
    pub async fn poll_result(&self) -> Option<WordCount> {
        let mut results = self.results.lock().await;
        tokio::time::timeout(self.poll_timeout, results.recv())
            .await
            .ok()
            .flatten()
    }

    /// Finishes the fragments already queued, then stops.
    ///
    /// Their results remain available to [`poll_result`](Self::poll_result).
    pub async fn shutdown(&self) {
        self.processor.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_words(text: &str) -> Vec<String> {
        text.split_whitespace().map(str::to_string).collect()
    }

    fn config() -> TransportConfig {
        TransportConfig::default().with_poll_timeout(Duration::from_millis(100))
    }

    #[test]
    fn test_count_words() {
        let counts = count_words(&to_words("a b a"));
        assert_eq!(counts.len(), 2);
        assert_eq!(counts["a"], 2);
        assert_eq!(counts["b"], 1);
    }

    #[test]
    fn test_count_is_case_sensitive() {
        let counts = count_words(&to_words("Word word WORD word"));
        assert_eq!(counts["word"], 2);
        assert_eq!(counts["Word"], 1);
        assert_eq!(counts["WORD"], 1);
    }

    #[test]
    fn test_count_empty() {
        assert!(count_words(&[]).is_empty());
    }

    #[tokio::test]
    async fn test_submit_then_poll() {
        let counter = WordCounter::spawn(&config());

        assert!(counter.submit(to_words("a b a")));

        let mut result = None;
        for _ in 0..20 {
            result = counter.poll_result().await;
            if result.is_some() {
                break;
            }
        }
        let counts = result.unwrap();
        assert_eq!(counts["a"], 2);
        assert_eq!(counts["b"], 1);

        counter.shutdown().await;
    }

    #[tokio::test]
    async fn test_results_are_not_merged() {
        let counter = WordCounter::spawn(&config());
        counter.submit(to_words("x x"));
        counter.submit(to_words("x"));
        counter.shutdown().await;

        let mut totals: Vec<usize> = Vec::new();
        while let Some(counts) = counter.poll_result().await {
            totals.push(counts["x"]);
        }
        totals.sort_unstable();
        assert_eq!(totals, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_empty_fragment_is_ignored() {
        let counter = WordCounter::spawn(&config());
        assert!(!counter.submit(Vec::new()));
        assert!(counter.poll_result().await.is_none());
        counter.shutdown().await;
    }

    #[tokio::test]
    async fn test_poll_times_out() {
        let counter = WordCounter::spawn(&config());
        let start = std::time::Instant::now();
        assert!(counter.poll_result().await.is_none());
        assert!(start.elapsed() >= Duration::from_millis(90));
        counter.shutdown().await;
    }
}
