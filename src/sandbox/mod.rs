//! One isolated JavaScript realm per evaluation.
//!
//! Each sandbox owns a fresh boa `Context` on its own OS thread. Nothing in
//! the realm is shared with the host or with other sandboxes; the only way
//! out is the envelope channel installed by [`bridge`].

mod bridge;
mod timers;
pub mod wire;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use boa_engine::builtins::promise::PromiseState;
use boa_engine::object::builtins::{JsArray, JsPromise};
use boa_engine::{js_string, Context, JsObject, JsResult, JsValue, Source};
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::config::SandboxConfig;
use crate::error::RunnerError;
use crate::harness::{Harness, Outcome, ReturnPolicy};
use crate::pipeline::Document;
use crate::protocol::Envelope;

use bridge::{Outbox, OutboxGuard};
use timers::TimerGuard;

/// Longest single sleep while waiting on a timer, so cancellation is seen
/// promptly.
const TIMER_NAP: Duration = Duration::from_millis(10);

pub struct Sandbox {
    id: Uuid,
    config: SandboxConfig,
    policy: ReturnPolicy,
}

impl Sandbox {
    pub fn new(id: Uuid, config: SandboxConfig, policy: ReturnPolicy) -> Self {
        Self { id, config, policy }
    }

    /// Starts the sandbox thread. Envelopes arrive on `outbox` as JSON
    /// text; raising `cancelled` silences the sandbox for good.
    pub fn spawn(
        self,
        document: Document,
        outbox: UnboundedSender<String>,
        cancelled: Arc<AtomicBool>,
    ) -> Result<JoinHandle<()>, RunnerError> {
        let handle = std::thread::Builder::new()
            .name(format!("sandbox-{}", self.id))
            .stack_size(self.config.thread_stack_size)
            .spawn(move || {
                let _guard = OutboxGuard::install(Outbox::new(outbox, cancelled.clone()));
                self.run(&document.script, cancelled);
            })?;
        Ok(handle)
    }

    fn run(&self, script: &str, cancelled: Arc<AtomicBool>) {
        let (mut context, _timers) = match self.realm() {
            Ok(realm) => realm,
            Err(err) => {
                log::error!("sandbox {} could not set up its realm: {}", self.id, err);
                report_failure(format!("sandbox setup failed: {}", err));
                return;
            }
        };

        if let Err(err) = context.eval(Source::from_bytes(script.as_bytes())) {
            let message = bridge::describe_error(&err, &mut context);
            log::debug!("sandbox {} script failed: {}", self.id, message);
            report_failure(message);
            return;
        }
        let _ = context.run_jobs();

        let harness = match collect_tests(&mut context, self.policy) {
            Ok(harness) => harness.with_cancellation(cancelled),
            Err(err) => {
                report_failure(bridge::describe_error(&err, &mut context));
                return;
            }
        };
        if harness.is_empty() {
            report_failure("no tests were registered");
            return;
        }

        log::debug!("sandbox {} running {} tests", self.id, harness.len());
        let results = harness.run_tests(&mut context);
        if bridge::is_cancelled() {
            return;
        }
        match Envelope::results(&results) {
            Ok(envelope) => {
                bridge::post(&envelope);
            }
            Err(err) => report_failure(err.to_string()),
        }
    }

    fn realm(&self) -> JsResult<(Context, TimerGuard)> {
        let mut context = Context::default();
        let limits = context.runtime_limits_mut();
        limits.set_loop_iteration_limit(self.config.loop_iteration_limit);
        limits.set_recursion_limit(self.config.recursion_limit);
        limits.set_stack_size_limit(self.config.stack_size_limit);
        bridge::register(&mut context)?;
        let timers = timers::register(&mut context)?;
        Ok((context, timers))
    }
}

fn report_failure(error: impl Into<String>) {
    if let Ok(envelope) = Envelope::test_error(error) {
        bridge::post(&envelope);
    }
}

/// Reads the realm's `__registeredTests` list into a harness, keeping
/// registration order.
fn collect_tests(context: &mut Context, policy: ReturnPolicy) -> JsResult<Harness<Context>> {
    let mut harness = Harness::new(policy);
    let registered = context
        .global_object()
        .get(js_string!("__registeredTests"), context)?;
    let Some(list) = registered.as_object() else {
        return Ok(harness);
    };
    let list = JsArray::from_object(list.clone())?;

    let length = u32::try_from(list.length(context)?).unwrap_or(u32::MAX);
    for index in 0..length {
        let entry = list.get(index, context)?;
        let Some(entry) = entry.as_object() else { continue };
        let entry = JsArray::from_object(entry.clone())?;
        let message = entry.get(0u32, context)?.to_string(context)?.to_std_string_escaped();
        let Some(body) = entry.get(1u32, context)?.as_object().cloned() else { continue };

        harness.test(message, move |context: &mut Context| run_test(&body, context));
    }
    Ok(harness)
}

fn run_test(body: &JsObject, context: &mut Context) -> Outcome {
    let value = match body.call(&JsValue::undefined(), &[], context) {
        Ok(value) => value,
        Err(err) => return Outcome::Threw(bridge::describe_error(&err, context)),
    };

    if let Some(object) = value.as_object() {
        if let Ok(promise) = JsPromise::from_object(object.clone()) {
            return match settle(&promise, context) {
                PromiseState::Fulfilled(_) => Outcome::Completed,
                PromiseState::Rejected(reason) => Outcome::Threw(bridge::describe_thrown(&reason, context)),
                PromiseState::Pending => Outcome::Threw("Test promise never settled".to_string()),
            };
        }
    }

    if value.is_undefined() {
        Outcome::Completed
    } else {
        Outcome::Returned {
            truthy: value.to_boolean(),
            rendered: value.display().to_string(),
        }
    }
}

/// Alternates the job queue with due timers until `promise` settles, no
/// timer is left, or the evaluation is cancelled.
fn settle(promise: &JsPromise, context: &mut Context) -> PromiseState {
    loop {
        let _ = context.run_jobs();
        let state = promise.state();
        if !matches!(state, PromiseState::Pending) || bridge::is_cancelled() {
            return state;
        }
        let Some(due) = timers::next_due() else {
            return state;
        };
        let now = Instant::now();
        if due > now {
            std::thread::sleep((due - now).min(TIMER_NAP));
            continue;
        }
        timers::fire_due(context);
    }
}
