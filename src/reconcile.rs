use std::time::Duration;

use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::oneshot;
use tokio::time::{interval, MissedTickBehavior};

use crate::config::RunnerConfig;
use crate::console::DiagnosticSink;
use crate::harness::TestResult;
use crate::protocol::{self, Delivery};

/// How a wait for sandbox results ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Resolved(Vec<TestResult>),
    TimedOut,
    Cancelled,
}

/// Polls a sandbox's envelope channel until results arrive, the retry
/// budget runs out, or the caller cancels.
#[derive(Debug, Clone, Copy)]
pub struct Reconciler {
    pub poll_interval: Duration,
    pub max_retries: u32,
}

impl Reconciler {
    pub fn new(poll_interval: Duration, max_retries: u32) -> Self {
        Self {
            poll_interval,
            max_retries,
        }
    }

    pub fn from_config(config: &RunnerConfig) -> Self {
        Self::new(config.poll_interval, config.max_retries)
    }

    pub fn timeout(&self) -> Duration {
        self.poll_interval.saturating_mul(self.max_retries)
    }

    /// The ticker lives only as long as this future, so neither outcome
    /// leaves a timer behind. A dropped cancel sender counts as a cancel.
    pub async fn wait(
        &self,
        inbox: &mut UnboundedReceiver<String>,
        sink: &dyn DiagnosticSink,
        cancel: &mut oneshot::Receiver<()>,
    ) -> Verdict {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut attempt: u32 = 0;

        loop {
            tokio::select! {
                _ = &mut *cancel => {
                    log::debug!("reconciler cancelled after {} polls", attempt);
                    return Verdict::Cancelled;
                }
                _ = ticker.tick() => {}
            }

            if let Some(results) = drain(inbox, sink) {
                log::debug!("reconciler resolved {} results after {} polls", results.len(), attempt);
                return Verdict::Resolved(results);
            }

            attempt += 1;
            if attempt > self.max_retries {
                log::info!("no results after {} polls ({:?})", self.max_retries, self.timeout());
                return Verdict::TimedOut;
            }
        }
    }
}

/// Handles every pending envelope; returns the first result batch found.
fn drain(inbox: &mut UnboundedReceiver<String>, sink: &dyn DiagnosticSink) -> Option<Vec<TestResult>> {
    loop {
        let raw = match inbox.try_recv() {
            Ok(raw) => raw,
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return None,
        };

        match protocol::receive(&raw) {
            Ok(Delivery::Diagnostic(level, text)) => sink.record(level, &text),
            Ok(Delivery::Results(results)) if !results.is_empty() => return Some(results),
            Ok(Delivery::Results(_)) => log::debug!("ignoring empty result batch"),
            Ok(Delivery::Failure(result)) => return Some(vec![result]),
            Err(err) => log::warn!("discarding malformed envelope: {}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::CapturedConsole;
    use crate::protocol::{Envelope, Source};
    use std::time::Instant;
    use tokio::sync::mpsc::unbounded_channel;

    #[tokio::test]
    async fn test_resolves_on_results() {
        let (tx, mut rx) = unbounded_channel();
        let (_cancel_tx, mut cancel_rx) = oneshot::channel();
        let console = CapturedConsole::new();

        tx.send("garbage".to_string()).unwrap();
        tx.send(Envelope::diagnostic(Source::Log, "hi").unwrap().encode().unwrap()).unwrap();
        tx.send(Envelope::results(&[TestResult::passed("a")]).unwrap().encode().unwrap()).unwrap();

        let verdict = Reconciler::new(Duration::from_millis(10), 5)
            .wait(&mut rx, &console, &mut cancel_rx)
            .await;
        assert_eq!(verdict, Verdict::Resolved(vec![TestResult::passed("a")]));
        assert_eq!(console.lines(), vec!["hi"]);
    }

    #[tokio::test]
    async fn test_times_out_within_window() {
        let (_tx, mut rx) = unbounded_channel::<String>();
        let (_cancel_tx, mut cancel_rx) = oneshot::channel();
        let reconciler = Reconciler::new(Duration::from_millis(20), 10);

        let started = Instant::now();
        let verdict = reconciler.wait(&mut rx, &CapturedConsole::new(), &mut cancel_rx).await;
        let elapsed = started.elapsed();

        assert_eq!(verdict, Verdict::TimedOut);
        assert!(elapsed >= reconciler.timeout());
        // One poll interval of slack, plus scheduler jitter.
        assert!(elapsed < reconciler.timeout() + reconciler.poll_interval + Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_empty_batches_keep_waiting() {
        let (tx, mut rx) = unbounded_channel();
        let (_cancel_tx, mut cancel_rx) = oneshot::channel();
        tx.send(Envelope::results(&[]).unwrap().encode().unwrap()).unwrap();
        drop(tx);

        let verdict = Reconciler::new(Duration::from_millis(5), 3)
            .wait(&mut rx, &CapturedConsole::new(), &mut cancel_rx)
            .await;
        assert_eq!(verdict, Verdict::TimedOut);
    }

    #[tokio::test]
    async fn test_cancel_stops_waiting() {
        let (_tx, mut rx) = unbounded_channel::<String>();
        let (cancel_tx, mut cancel_rx) = oneshot::channel();
        let reconciler = Reconciler::new(Duration::from_millis(50), 1_000);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(60)).await;
            let _ = cancel_tx.send(());
        });

        let started = Instant::now();
        let verdict = reconciler.wait(&mut rx, &CapturedConsole::new(), &mut cancel_rx).await;
        assert_eq!(verdict, Verdict::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
