pub mod challenge;
pub mod compiler;
pub mod config;
pub mod console;
pub mod error;
pub mod expect;
pub mod grader;
pub mod harness;
pub mod pipeline;
pub mod protocol;
pub mod reconcile;
pub mod sandbox;

pub use challenge::{Challenge, ChallengeType};
pub use config::{RunnerConfig, SandboxConfig};
pub use console::{CapturedConsole, DiagnosticSink, LogSink};
pub use error::{CompileError, ProtocolError, RunnerError, WireError};
pub use grader::{Evaluation, EvaluationOutcome, Grader};
pub use harness::{Harness, Outcome, ReturnPolicy, TestResult};

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn typescript(solution: &str, tests: &str) -> Challenge {
        Challenge::new("ts-challenge", ChallengeType::Typescript)
            .with_solution(solution)
            .with_tests(tests)
    }

    fn completed(outcome: EvaluationOutcome) -> Vec<TestResult> {
        match outcome {
            EvaluationOutcome::Completed(results) => results,
            other => panic!("expected completed evaluation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_single_passing_test() {
        init_logging();
        let grader = Grader::default();
        let challenge = typescript("", r#"test("adds", () => { expect(1 + 1).toBe(2); });"#);

        let results = completed(grader.grade(&challenge).await.unwrap());
        assert_eq!(results, vec![TestResult::passed("adds")]);

        let json = serde_json::to_value(&results).unwrap();
        assert_eq!(json, serde_json::json!([{"message": "adds", "testResult": true, "error": null}]));
    }

    #[tokio::test]
    async fn test_wrong_solution_fails_every_generated_case() {
        init_logging();
        let mut rng = StdRng::seed_from_u64(42);
        let mut tests = String::new();
        for i in 0..11 {
            // Keep clear of a * b == a + b (0,0 and 2,2).
            let a: i32 = rng.gen_range(3..1000);
            let b: i32 = rng.gen_range(3..1000);
            tests.push_str(&format!(
                "test(\"case {}: addTwoNumbers({}, {})\", () => {{ expect(addTwoNumbers({}, {})).toBe({}); }});\n",
                i,
                a,
                b,
                a,
                b,
                a + b
            ));
        }
        let challenge = typescript(
            "function addTwoNumbers(a: number, b: number): number { return a * b; }",
            &tests,
        );

        let results = completed(Grader::default().grade(&challenge).await.unwrap());
        assert_eq!(results.len(), 11);
        for (i, result) in results.iter().enumerate() {
            assert!(result.message.starts_with(&format!("case {}:", i)));
            assert!(!result.test_result);
            assert!(result.error.is_some());
        }
    }

    #[tokio::test]
    async fn test_registration_order_is_preserved() {
        init_logging();
        let tests: String = (0..20)
            .map(|i| format!("test(\"t{}\", () => {{ expect({}).toBeLessThan(10); }});\n", i, i))
            .collect();
        let results = completed(Grader::default().grade(&typescript("", &tests)).await.unwrap());

        assert_eq!(results.len(), 20);
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.message, format!("t{}", i));
            assert_eq!(result.test_result, i < 10);
        }
    }

    #[tokio::test]
    async fn test_matchers_inside_the_sandbox() {
        init_logging();
        let tests = r#"
test("close to", () => { expect(0.1 + 0.2).toBeCloseTo(0.3, 5); });
test("not exact", () => { expect(0.1 + 0.2).not.toBe(0.3); });
test("property path", () => { expect({ a: 1, b: 2 }).toHaveProperty(["b"], 2); });
test("missing property", () => { expect({ a: 1, b: 2 }).toHaveProperty(["c"]); });
test("pattern", () => { expect("Hello World").toMatch(/world/i); });
test("custom", () => {
  expect.extend({ toBeEven: (n) => ({ pass: n % 2 === 0, message: () => n + " is odd" }) });
  expect(3).not.toBeEven();
  expect(4).toBeEven();
});
"#;
        let results = completed(Grader::default().grade(&typescript("", tests)).await.unwrap());
        let passed: Vec<bool> = results.iter().map(|r| r.test_result).collect();
        assert_eq!(passed, vec![true, true, true, false, true, true]);
    }

    #[tokio::test]
    async fn test_async_solution_waits_on_timers() {
        init_logging();
        let challenge = typescript(
            "async function later<T>(value: T, ms: number): Promise<T> { return new Promise((resolve) => setTimeout(() => resolve(value), ms)); }",
            r#"test("waits", async () => { expect(await later(7, 20)).toBe(7); });"#,
        );

        let results = completed(Grader::default().grade(&challenge).await.unwrap());
        assert_eq!(results, vec![TestResult::passed("waits")]);
    }

    #[tokio::test]
    async fn test_syntax_error_is_one_failure() {
        init_logging();
        let challenge = typescript("function broken( {", r#"test("never runs", () => {});"#);

        let results = completed(Grader::default().grade(&challenge).await.unwrap());
        assert_eq!(results.len(), 1);
        assert!(!results[0].test_result);
        assert!(results[0].error.as_deref().unwrap().starts_with("SyntaxError"));
    }

    #[tokio::test]
    async fn test_setup_throw_is_one_failure() {
        init_logging();
        let challenge = typescript(
            "const config = JSON.parse('{oops');",
            r#"test("a", () => {}); test("b", () => {});"#,
        );

        let results = completed(Grader::default().grade(&challenge).await.unwrap());
        assert_eq!(results.len(), 1);
        assert!(!results[0].test_result);
        assert!(results[0].error.as_deref().unwrap().contains("SyntaxError"));
    }

    #[tokio::test]
    async fn test_non_code_challenges_have_no_tests() {
        let grader = Grader::default();
        for kind in [ChallengeType::Media, ChallengeType::Section, ChallengeType::Other] {
            let outcome = grader.grade(&Challenge::new("lesson", kind)).await.unwrap();
            assert_eq!(outcome, EvaluationOutcome::NoTests);
        }
    }

    #[tokio::test]
    async fn test_invalid_challenge_is_an_error() {
        let result = Grader::default().grade(&Challenge::new("", ChallengeType::Typescript)).await;
        assert!(matches!(result, Err(RunnerError::InvalidChallenge(_))));
    }

    #[tokio::test]
    async fn test_react_challenge_renders() {
        init_logging();
        let challenge = Challenge::new("react-greeting", ChallengeType::React)
            .with_solution(
                r#"import React from "react";
export default function Greeting({ name }: { name: string }) {
  return <p className="greeting">Hello, {name}!</p>;
}"#,
            )
            .with_tests(
                r#"test("renders the name", () => {
  expect(renderToString(<Greeting name="Ada" />)).toBe('<p class="greeting">Hello, Ada!</p>');
});"#,
            );

        let results = completed(Grader::default().grade(&challenge).await.unwrap());
        assert_eq!(results, vec![TestResult::passed("renders the name")]);
    }

    #[tokio::test]
    async fn test_markup_challenge() {
        init_logging();
        let challenge = Challenge::new("markup-heading", ChallengeType::Markup)
            .with_starter("<main><h1>Welcome</h1></main>")
            .with_tests(r#"test("has a heading", () => { expect(markup).toMatch(/<h1>\s*Welcome/); });"#);

        let results = completed(Grader::default().grade(&challenge).await.unwrap());
        assert!(results[0].test_result);
    }

    #[tokio::test]
    async fn test_hung_sandbox_times_out() {
        init_logging();
        let config = RunnerConfig {
            poll_interval: Duration::from_millis(20),
            max_retries: 10,
            sandbox: SandboxConfig {
                loop_iteration_limit: u64::MAX,
                ..SandboxConfig::default()
            },
            ..RunnerConfig::default()
        };
        let timeout = config.timeout();
        // Busy for far longer than the window.
        let challenge = typescript(
            "",
            "const start = Date.now();\nwhile (Date.now() - start < 2000) {}\ntest('late', () => {});",
        );

        let started = Instant::now();
        let results = completed(Grader::new(config).grade(&challenge).await.unwrap());
        assert_eq!(results.len(), 1);
        assert!(!results[0].test_result);
        assert!(results[0].error.as_deref().unwrap().contains("No test results"));
        assert!(started.elapsed() >= timeout);
    }

    #[tokio::test]
    async fn test_cancelled_evaluation_reports_nothing() {
        init_logging();
        let challenge = typescript("", "while (true) {}\ntest('never', () => {});");
        let mut evaluation = Grader::default().evaluate(&challenge).unwrap();
        evaluation.cancel();

        let started = Instant::now();
        assert_eq!(evaluation.outcome().await.unwrap(), EvaluationOutcome::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_console_output_reaches_the_sink() {
        init_logging();
        let console = CapturedConsole::new();
        let grader = Grader::default().with_sink(Arc::new(console.clone()));
        let challenge = typescript(
            "function greet(name: string) { console.log(`hi ${name}`); return name; }",
            r#"test("greets", () => { expect(greet("ada")).toBe("ada"); });"#,
        );

        let results = completed(grader.grade(&challenge).await.unwrap());
        assert!(results[0].test_result);
        assert_eq!(console.lines(), vec!["hi ada"]);
    }

    #[tokio::test]
    async fn test_concurrent_evaluations_are_isolated() {
        init_logging();
        let polluter = typescript(
            "globalThis.expect = () => ({ toBe() {} }); var shared = 'polluted';",
            r#"test("pollutes", () => { expect(1).toBe(2); });"#,
        );
        let clean = typescript(
            "",
            r#"test("clean realm", () => { expect(typeof shared).toBe("undefined"); expect(1).not.toBe(2); });"#,
        );

        let outcomes = Grader::default().grade_all(&[polluter, clean]).await;
        let clean_results = completed(outcomes[1].as_ref().unwrap().clone());
        assert_eq!(clean_results, vec![TestResult::passed("clean realm")]);
    }
}
