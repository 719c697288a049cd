use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::expect::AssertionError;

/// One row of the report handed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub message: String,
    pub test_result: bool,
    pub error: Option<String>,
}

impl TestResult {
    pub fn passed(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            test_result: true,
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            test_result: false,
            error: Some(error.into()),
        }
    }

    pub fn compile_failure(error: impl fmt::Display) -> Self {
        Self::failed("Code failed to compile", error.to_string())
    }

    pub fn sandbox_failure(error: impl Into<String>) -> Self {
        Self::failed("Test setup failed", error)
    }

    pub fn timeout(window: Duration) -> Self {
        Self::failed(
            "Tests timed out",
            format!("No test results were received within {} ms", window.as_millis()),
        )
    }
}

/// What a test body did when it was called.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Ran to completion and returned nothing.
    Completed,
    /// Returned a value other than `undefined` from a synchronous body.
    Returned { truthy: bool, rendered: String },
    Threw(String),
}

impl From<Result<(), AssertionError>> for Outcome {
    fn from(result: Result<(), AssertionError>) -> Self {
        match result {
            Ok(()) => Outcome::Completed,
            Err(err) => Outcome::Threw(err.message().to_string()),
        }
    }
}

/// How a value returned by a synchronous test body is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnPolicy {
    /// A falsy return value fails the test.
    #[default]
    Honor,
    /// Only exceptions fail a test.
    Ignore,
}

impl FromStr for ReturnPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "honor" | "honour" => Ok(Self::Honor),
            "ignore" => Ok(Self::Ignore),
            other => Err(format!("expected `honor` or `ignore`, got `{}`", other)),
        }
    }
}

type TestFn<C> = Box<dyn FnMut(&mut C) -> Outcome>;

pub struct TestCase<C> {
    pub message: String,
    test: TestFn<C>,
}

impl<C> fmt::Debug for TestCase<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase").field("message", &self.message).finish()
    }
}

/// Flat, sequential test runner. `C` is whatever context the test bodies
/// need at run time (a JS realm inside the sandbox, `()` in plain Rust).
pub struct Harness<C> {
    tests: Vec<TestCase<C>>,
    policy: ReturnPolicy,
    cancelled: Option<Arc<AtomicBool>>,
}

impl<C> Default for Harness<C> {
    fn default() -> Self {
        Self::new(ReturnPolicy::default())
    }
}

impl<C> Harness<C> {
    pub fn new(policy: ReturnPolicy) -> Self {
        Self {
            tests: Vec::new(),
            policy,
            cancelled: None,
        }
    }

    pub fn with_cancellation(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancelled = Some(flag);
        self
    }

    /// Registers a test. The body is not called until [`Harness::run_tests`].
    pub fn test<F>(&mut self, message: impl Into<String>, f: F)
    where
        F: FnMut(&mut C) -> Outcome + 'static,
    {
        self.tests.push(TestCase {
            message: message.into(),
            test: Box::new(f),
        });
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    pub fn messages(&self) -> impl Iterator<Item = &str> {
        self.tests.iter().map(|t| t.message.as_str())
    }

    /// Runs every registered test in registration order. A cancelled run
    /// reports nothing.
    pub fn run_tests(self, context: &mut C) -> Vec<TestResult> {
        let Harness { tests, policy, cancelled } = self;
        let is_cancelled = || cancelled.as_ref().map_or(false, |flag| flag.load(Ordering::SeqCst));
        let mut results = Vec::with_capacity(tests.len());

        for mut case in tests {
            if is_cancelled() {
                log::debug!("harness cancelled before `{}`", case.message);
                return Vec::new();
            }

            let outcome = catch_unwind(AssertUnwindSafe(|| (case.test)(context)))
                .unwrap_or_else(|panic| Outcome::Threw(panic_message(panic)));

            results.push(policy.judge(case.message, outcome));
        }

        if is_cancelled() {
            return Vec::new();
        }
        results
    }
}

impl ReturnPolicy {
    fn judge(self, message: String, outcome: Outcome) -> TestResult {
        match outcome {
            Outcome::Completed => TestResult::passed(message),
            Outcome::Threw(error) => TestResult::failed(message, error),
            Outcome::Returned { truthy, rendered } => {
                if truthy || self == ReturnPolicy::Ignore {
                    TestResult::passed(message)
                } else {
                    TestResult::failed(
                        message,
                        format!("Expected test to return a truthy value, received: {}", rendered),
                    )
                }
            }
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "test panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expect::{expect, Matchers};

    #[test]
    fn test_results_follow_registration_order() {
        let mut harness: Harness<()> = Harness::default();
        let names: Vec<String> = (0..25).map(|i| format!("case {}", i)).collect();
        for (i, name) in names.iter().enumerate() {
            harness.test(name.clone(), move |_| {
                if i % 3 == 0 {
                    Outcome::Threw(format!("boom {}", i))
                } else {
                    Outcome::Completed
                }
            });
        }

        let results = harness.run_tests(&mut ());
        assert_eq!(results.len(), names.len());
        for (i, (result, name)) in results.iter().zip(&names).enumerate() {
            assert_eq!(&result.message, name);
            assert_eq!(result.test_result, i % 3 != 0);
            assert_eq!(result.error.is_none(), result.test_result);
        }
    }

    #[test]
    fn test_assertions_drive_results() {
        let mut harness: Harness<()> = Harness::default();
        harness.test("adds", |_| expect(1 + 1).to_be(2).into());
        harness.test("subtracts", |_| expect(1 - 1).to_be(1).into());

        let results = harness.run_tests(&mut ());
        assert_eq!(results[0], TestResult::passed("adds"));
        assert!(!results[1].test_result);
        assert!(results[1].error.as_deref().unwrap().contains("toBe"));
    }

    #[test]
    fn test_registration_does_not_run_bodies() {
        let mut harness: Harness<u32> = Harness::default();
        harness.test("counts", |calls: &mut u32| {
            *calls += 1;
            Outcome::Completed
        });

        let mut calls = 0;
        assert_eq!(harness.len(), 1);
        harness.run_tests(&mut calls);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_panics_are_reported_as_failures() {
        let mut harness: Harness<()> = Harness::default();
        harness.test("panics", |_| panic!("went sideways"));
        harness.test("still runs", |_| Outcome::Completed);

        let results = harness.run_tests(&mut ());
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].error.as_deref(), Some("went sideways"));
        assert!(results[1].test_result);
    }

    #[test]
    fn test_implicit_return_policy() {
        let falsy = || Outcome::Returned {
            truthy: false,
            rendered: "false".to_string(),
        };

        let mut honor: Harness<()> = Harness::new(ReturnPolicy::Honor);
        honor.test("one-liner", move |_| falsy());
        let results = honor.run_tests(&mut ());
        assert!(!results[0].test_result);
        assert!(results[0].error.as_deref().unwrap().contains("received: false"));

        let mut ignore: Harness<()> = Harness::new(ReturnPolicy::Ignore);
        ignore.test("one-liner", move |_| falsy());
        assert!(ignore.run_tests(&mut ())[0].test_result);
    }

    #[test]
    fn test_cancelled_run_reports_nothing() {
        let flag = Arc::new(AtomicBool::new(false));
        let mut harness: Harness<()> = Harness::default().with_cancellation(flag.clone());
        let trip = flag.clone();
        harness.test("first", move |_| {
            trip.store(true, Ordering::SeqCst);
            Outcome::Completed
        });
        harness.test("second", |_| Outcome::Completed);

        assert!(harness.run_tests(&mut ()).is_empty());
    }

    #[test]
    fn test_result_wire_shape() {
        let json = serde_json::to_value(TestResult::passed("adds")).unwrap();
        assert_eq!(json, serde_json::json!({"message": "adds", "testResult": true, "error": null}));
        assert_eq!("Ignore".parse::<ReturnPolicy>(), Ok(ReturnPolicy::Ignore));
        assert!("sometimes".parse::<ReturnPolicy>().is_err());
    }
}
