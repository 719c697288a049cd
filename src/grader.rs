use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::mpsc::unbounded_channel;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::challenge::Challenge;
use crate::config::RunnerConfig;
use crate::console::{DiagnosticSink, LogSink};
use crate::error::RunnerError;
use crate::harness::TestResult;
use crate::pipeline;
use crate::reconcile::{Reconciler, Verdict};
use crate::sandbox::Sandbox;

/// Final answer for one challenge.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "results", rename_all = "camelCase")]
pub enum EvaluationOutcome {
    /// The challenge type carries no runnable code.
    NoTests,
    Completed(Vec<TestResult>),
    Cancelled,
}

impl EvaluationOutcome {
    pub fn results(&self) -> &[TestResult] {
        match self {
            EvaluationOutcome::Completed(results) => results,
            _ => &[],
        }
    }

    pub fn passed(&self) -> bool {
        match self {
            EvaluationOutcome::Completed(results) => !results.is_empty() && results.iter().all(|r| r.test_result),
            _ => false,
        }
    }
}

/// Runs challenges. Each evaluation gets its own sandbox, channel and timer.
#[derive(Clone)]
pub struct Grader {
    config: RunnerConfig,
    sink: Arc<dyn DiagnosticSink>,
}

impl Default for Grader {
    fn default() -> Self {
        Self::new(RunnerConfig::default())
    }
}

impl Grader {
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            config,
            sink: Arc::new(LogSink),
        }
    }

    pub fn from_env() -> Result<Self, RunnerError> {
        Ok(Self::new(RunnerConfig::from_env()?))
    }

    /// Routes sandbox console output somewhere other than the log.
    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Starts evaluating `challenge` in the background. Must be called from
    /// within a tokio runtime.
    pub fn evaluate(&self, challenge: &Challenge) -> Result<Evaluation, RunnerError> {
        challenge.validate()?;

        let id = Uuid::new_v4();
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let cancelled = Arc::new(AtomicBool::new(false));

        log::info!("evaluation {} started for challenge {} ({})", id, challenge.id, challenge.kind);
        let task = tokio::spawn(run_evaluation(
            id,
            challenge.clone(),
            self.config.clone(),
            self.sink.clone(),
            cancel_rx,
            cancelled.clone(),
        ));

        Ok(Evaluation {
            id,
            cancel: Some(cancel_tx),
            cancelled,
            task: Some(task),
        })
    }

    pub async fn grade(&self, challenge: &Challenge) -> Result<EvaluationOutcome, RunnerError> {
        self.evaluate(challenge)?.outcome().await
    }

    /// Grades several challenges concurrently; results keep input order.
    pub async fn grade_all(&self, challenges: &[Challenge]) -> Vec<Result<EvaluationOutcome, RunnerError>> {
        join_all(challenges.iter().map(|challenge| self.grade(challenge))).await
    }
}

/// Handle to an in-flight evaluation. Dropping it cancels the evaluation.
pub struct Evaluation {
    id: Uuid,
    cancel: Option<oneshot::Sender<()>>,
    cancelled: Arc<AtomicBool>,
    task: Option<JoinHandle<Result<EvaluationOutcome, RunnerError>>>,
}

impl Evaluation {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Stops polling and silences the sandbox. No results are delivered
    /// after this returns.
    pub fn cancel(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }

    pub async fn outcome(mut self) -> Result<EvaluationOutcome, RunnerError> {
        match self.task.take() {
            Some(task) => task.await?,
            None => Ok(EvaluationOutcome::Cancelled),
        }
    }
}

impl Drop for Evaluation {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn run_evaluation(
    id: Uuid,
    challenge: Challenge,
    config: RunnerConfig,
    sink: Arc<dyn DiagnosticSink>,
    mut cancel: oneshot::Receiver<()>,
    cancelled: Arc<AtomicBool>,
) -> Result<EvaluationOutcome, RunnerError> {
    if !challenge.kind.is_executable() {
        log::debug!("evaluation {}: {} challenges have no tests", id, challenge.kind);
        return Ok(EvaluationOutcome::NoTests);
    }

    let prepared = tokio::task::spawn_blocking(move || pipeline::prepare(&challenge)).await?;
    let document = match prepared {
        Ok(prepared) => prepared.document,
        Err(err) => {
            log::info!("evaluation {}: {}", id, err);
            return Ok(EvaluationOutcome::Completed(vec![TestResult::compile_failure(err)]));
        }
    };

    if cancel.try_recv().is_ok() || cancelled.load(Ordering::SeqCst) {
        return Ok(EvaluationOutcome::Cancelled);
    }

    let (outbox, mut inbox) = unbounded_channel();
    let sandbox = Sandbox::new(id, config.sandbox.clone(), config.implicit_return);
    // The thread is detached; a runaway realm ends at its runtime limits.
    let _thread = sandbox.spawn(document, outbox, cancelled.clone())?;

    let reconciler = Reconciler::from_config(&config);
    let verdict = reconciler.wait(&mut inbox, sink.as_ref(), &mut cancel).await;
    cancelled.store(true, Ordering::SeqCst);

    Ok(match verdict {
        Verdict::Resolved(results) => {
            log::info!(
                "evaluation {} finished: {}/{} passed",
                id,
                results.iter().filter(|r| r.test_result).count(),
                results.len()
            );
            EvaluationOutcome::Completed(results)
        }
        Verdict::TimedOut => {
            log::warn!("evaluation {} timed out after {:?}", id, reconciler.timeout());
            EvaluationOutcome::Completed(vec![TestResult::timeout(reconciler.timeout())])
        }
        Verdict::Cancelled => {
            log::info!("evaluation {} cancelled", id);
            EvaluationOutcome::Cancelled
        }
    })
}
