//! Jest-style assertions over JavaScript values.
//!
//! `expect(received)` returns an [`Expectation`]; every matcher either
//! returns `Ok(())` or an [`AssertionError`] whose message carries the
//! matcher header, the expected value and the received value.

mod equality;
mod format;
mod matchers;
mod value;

use thiserror::Error;

pub use equality::{deep_equals, object_is, strict_equals};
pub use format::{elide, render, render_number, MAX_RENDERED_LINES};
pub use matchers::Matcher;
pub use value::{Callable, Object, RegExp, Symbol, Thrown, Value};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct AssertionError {
    message: String,
}

impl AssertionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub(crate) fn append(&mut self, line: &str) {
        self.message.push('\n');
        self.message.push_str(line);
    }
}

impl From<AssertionError> for Thrown {
    fn from(err: AssertionError) -> Self {
        Thrown::new(err.message)
    }
}

pub fn expect(received: impl Into<Value>) -> Expectation {
    Expectation { received: received.into() }
}

/// Shared by positive and negated expectations. Every typed helper funnels
/// into [`Matchers::apply`].
pub trait Matchers {
    fn apply(&self, matcher: Matcher, args: &[Value]) -> Result<(), AssertionError>;

    fn to_be(&self, expected: impl Into<Value>) -> Result<(), AssertionError> {
        self.apply(Matcher::ToBe, &[expected.into()])
    }

    fn to_equal(&self, expected: impl Into<Value>) -> Result<(), AssertionError> {
        self.apply(Matcher::ToEqual, &[expected.into()])
    }

    fn to_be_greater_than(&self, expected: impl Into<Value>) -> Result<(), AssertionError> {
        self.apply(Matcher::ToBeGreaterThan, &[expected.into()])
    }

    fn to_be_greater_than_or_equal(&self, expected: impl Into<Value>) -> Result<(), AssertionError> {
        self.apply(Matcher::ToBeGreaterThanOrEqual, &[expected.into()])
    }

    fn to_be_less_than(&self, expected: impl Into<Value>) -> Result<(), AssertionError> {
        self.apply(Matcher::ToBeLessThan, &[expected.into()])
    }

    fn to_be_less_than_or_equal(&self, expected: impl Into<Value>) -> Result<(), AssertionError> {
        self.apply(Matcher::ToBeLessThanOrEqual, &[expected.into()])
    }

    fn to_match(&self, expected: impl Into<Value>) -> Result<(), AssertionError> {
        self.apply(Matcher::ToMatch, &[expected.into()])
    }

    fn to_have_property(&self, path: impl Into<Value>) -> Result<(), AssertionError> {
        self.apply(Matcher::ToHaveProperty, &[path.into()])
    }

    fn to_have_property_value(
        &self,
        path: impl Into<Value>,
        value: impl Into<Value>,
    ) -> Result<(), AssertionError> {
        self.apply(Matcher::ToHaveProperty, &[path.into(), value.into()])
    }

    fn to_be_truthy(&self) -> Result<(), AssertionError> {
        self.apply(Matcher::ToBeTruthy, &[])
    }

    fn to_be_falsy(&self) -> Result<(), AssertionError> {
        self.apply(Matcher::ToBeFalsy, &[])
    }

    fn to_be_close_to(&self, expected: impl Into<Value>) -> Result<(), AssertionError> {
        self.apply(Matcher::ToBeCloseTo, &[expected.into()])
    }

    fn to_be_close_to_precision(&self, expected: impl Into<Value>, precision: u32) -> Result<(), AssertionError> {
        self.apply(Matcher::ToBeCloseTo, &[expected.into(), Value::from(precision)])
    }

    fn to_be_defined(&self) -> Result<(), AssertionError> {
        self.apply(Matcher::ToBeDefined, &[])
    }

    fn to_contain(&self, item: impl Into<Value>) -> Result<(), AssertionError> {
        self.apply(Matcher::ToContain, &[item.into()])
    }

    fn to_throw(&self) -> Result<(), AssertionError> {
        self.apply(Matcher::ToThrow, &[])
    }

    fn to_throw_matching(&self, expected: impl Into<Value>) -> Result<(), AssertionError> {
        self.apply(Matcher::ToThrow, &[expected.into()])
    }
}

#[derive(Debug, Clone)]
pub struct Expectation {
    received: Value,
}

impl Expectation {
    pub fn received(&self) -> &Value {
        &self.received
    }

    /// The same matchers with their outcome inverted.
    pub fn not(&self) -> Negated<'_> {
        Negated { inner: self }
    }
}

impl Matchers for Expectation {
    fn apply(&self, matcher: Matcher, args: &[Value]) -> Result<(), AssertionError> {
        matcher.check(&self.received, args)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Negated<'a> {
    inner: &'a Expectation,
}

impl Matchers for Negated<'_> {
    fn apply(&self, matcher: Matcher, args: &[Value]) -> Result<(), AssertionError> {
        invert(matcher, &self.inner.received, args, matcher.check(&self.inner.received, args))
    }
}

fn invert(
    matcher: Matcher,
    received: &Value,
    args: &[Value],
    outcome: Result<(), AssertionError>,
) -> Result<(), AssertionError> {
    match outcome {
        Err(_) => Ok(()),
        Ok(()) => {
            let mut message = format!("{}\n\n", matcher.header(true));
            match args.first() {
                Some(expected) => {
                    message.push_str(&format!("Expected NOT: {}\n", render(expected)));
                    message.push_str(&format!("Received:     {}", render(received)));
                }
                None => message.push_str(&format!("Received: {}", render(received))),
            }
            Err(AssertionError::new(message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_to_be_uses_strict_equality() {
        assert!(expect(2).to_be(2).is_ok());
        assert!(expect("a").to_be("a").is_ok());
        let err = expect(json!({"a": 1})).to_be(json!({"a": 1})).unwrap_err();
        assert!(err.message().contains("toEqual"));
    }

    #[test]
    fn test_to_equal_compares_structure() {
        assert!(expect(json!({"a": [1, 2]})).to_equal(json!({"a": [1, 2]})).is_ok());
        assert!(expect(json!([1, 2])).to_equal(json!([2, 1])).is_err());
    }

    /// Received value and arguments for which `matcher` passes, then a pair
    /// for which it fails.
    fn outcomes(matcher: Matcher) -> [(Value, Vec<Value>); 2] {
        match matcher {
            Matcher::ToBe => [(Value::from(1), vec![Value::from(1)]), (Value::from(1), vec![Value::from(2)])],
            Matcher::ToEqual => [
                (Value::from(json!([1])), vec![Value::from(json!([1]))]),
                (Value::from(json!([1])), vec![Value::from(json!([2]))]),
            ],
            Matcher::ToBeGreaterThan => [(Value::from(5), vec![Value::from(3)]), (Value::from(3), vec![Value::from(5)])],
            Matcher::ToBeGreaterThanOrEqual => {
                [(Value::from(3), vec![Value::from(3)]), (Value::from(2), vec![Value::from(3)])]
            }
            Matcher::ToBeLessThan => [(Value::from(2), vec![Value::from(3)]), (Value::from(3), vec![Value::from(3)])],
            Matcher::ToBeLessThanOrEqual => {
                [(Value::from(3), vec![Value::from(3)]), (Value::from(4), vec![Value::from(3)])]
            }
            Matcher::ToMatch => [
                (Value::from("hello"), vec![Value::regexp("^h", "")]),
                (Value::from("hello"), vec![Value::regexp("^x", "")]),
            ],
            Matcher::ToHaveProperty => [
                (Value::from(json!({"a": {"b": 1}})), vec![Value::from("a.b")]),
                (Value::from(json!({"a": {}})), vec![Value::from("a.b")]),
            ],
            Matcher::ToBeTruthy => [(Value::from(1), vec![]), (Value::from(0), vec![])],
            Matcher::ToBeFalsy => [(Value::from(0), vec![]), (Value::from(1), vec![])],
            Matcher::ToBeCloseTo => [
                (Value::from(0.3), vec![Value::from(0.1 + 0.2)]),
                (Value::from(0.3), vec![Value::from(0.4)]),
            ],
            Matcher::ToBeDefined => [(Value::Null, vec![]), (Value::Undefined, vec![])],
            Matcher::ToContain => [
                (Value::from(json!([1, 2])), vec![Value::from(2)]),
                (Value::from(json!([1, 2])), vec![Value::from(3)]),
            ],
            Matcher::ToThrow => [
                (Value::function("boom", || Err(Thrown::new("boom"))), vec![]),
                (Value::function("quiet", || Ok(Value::Undefined)), vec![]),
            ],
        }
    }

    #[test]
    fn test_negation_inverts_every_matcher() {
        for matcher in Matcher::ALL {
            let [(passing, pass_args), (failing, fail_args)] = outcomes(matcher);

            assert!(expect(passing.clone()).apply(matcher, &pass_args).is_ok(), "{} should pass", matcher);
            let err = expect(passing).not().apply(matcher, &pass_args).unwrap_err();
            assert!(
                err.message().contains(&format!(".not.{}", matcher.name())),
                "{}: {}",
                matcher,
                err.message()
            );

            assert!(expect(failing.clone()).apply(matcher, &fail_args).is_err(), "{} should fail", matcher);
            assert!(expect(failing).not().apply(matcher, &fail_args).is_ok(), "not.{} should pass", matcher);
        }
    }

    #[test]
    fn test_negated_failure_message() {
        let err = expect(3).not().to_be(3).unwrap_err();
        assert!(err.message().starts_with("expect(received).not.toBe(expected)"));
        assert!(err.message().contains("Expected NOT: 3"));
    }

    #[test]
    fn test_numeric_comparisons_require_numbers() {
        assert!(expect(5).to_be_greater_than(3).is_ok());
        assert!(expect(3).to_be_greater_than_or_equal(3).is_ok());
        assert!(expect(3).to_be_less_than(3).is_err());
        let err = expect("5").to_be_greater_than(3).unwrap_err();
        assert!(err.message().contains("Received value must be a number"));
    }

    #[test]
    fn test_to_match_substring_and_pattern() {
        assert!(expect("hello world").to_match("lo wo").is_ok());
        assert!(expect("Hello").to_match(Value::regexp("^hello$", "i")).is_ok());
        assert!(expect("Hello").to_match(Value::regexp("^hello$", "")).is_err());
        assert!(expect(42).to_match("4").is_err());
    }

    #[test]
    fn test_to_have_property_paths() {
        let subject = json!({"a": {"b": [10, 20, 30]}, "name": "x"});
        assert!(expect(subject.clone()).to_have_property("a.b").is_ok());
        assert!(expect(subject.clone()).to_have_property("a.b.length").is_ok());
        assert!(expect(subject.clone()).to_have_property_value("a.b.1", 20).is_ok());
        assert!(expect(subject.clone())
            .to_have_property_value(Value::array([Value::from("a"), Value::from("b"), Value::from(2)]), 30)
            .is_ok());
        assert!(expect(subject.clone()).to_have_property_value("name.length", 1).is_ok());
        assert!(expect(subject.clone()).to_have_property("a.c").is_err());
        assert!(expect(subject).to_have_property_value("a.b", json!([10, 20])).is_err());
    }

    #[test]
    fn test_to_have_property_distinguishes_explicit_undefined() {
        let subject = Value::object([("a", Value::from(1))]);
        assert!(expect(subject.clone()).to_have_property("a").is_ok());
        assert!(expect(subject).to_have_property_value("a", Value::Undefined).is_err());
    }

    #[test]
    fn test_truthiness_matchers() {
        assert!(expect(1).to_be_truthy().is_ok());
        assert!(expect("").to_be_falsy().is_ok());
        assert!(expect(Value::Null).to_be_truthy().is_err());
    }

    #[test]
    fn test_to_be_close_to() {
        assert!(expect(0.1 + 0.2).to_be_close_to(0.3).is_ok());
        assert!(expect(0.1 + 0.2).to_equal(0.3).is_err());
        assert!(expect(3.14159).to_be_close_to_precision(3.14, 2).is_ok());
        assert!(expect(3.14159).to_be_close_to_precision(3.14, 3).is_err());
        assert!(expect(f64::INFINITY).to_be_close_to(f64::INFINITY).is_ok());
        assert!(expect(f64::INFINITY).to_be_close_to(f64::NEG_INFINITY).is_err());
        let err = expect("0.3").to_be_close_to(0.3).unwrap_err();
        assert!(err.message().contains("must be a number"));
    }

    #[test]
    fn test_to_be_defined() {
        assert!(expect(Value::Null).to_be_defined().is_ok());
        assert!(expect(Value::Undefined).to_be_defined().is_err());
    }

    #[test]
    fn test_to_contain() {
        let shared = Value::object([("id", Value::from(1))]);
        let list = Value::array([shared.clone(), Value::from(2)]);
        assert!(expect(list.clone()).to_contain(shared).is_ok());
        assert!(expect(list.clone()).to_contain(Value::object([("id", Value::from(1))])).is_err());
        assert!(expect(list).to_contain(2).is_ok());
        assert!(expect("haystack").to_contain("st").is_ok());
        assert!(expect("haystack").to_contain(1).is_err());
        assert!(expect(7).to_contain(7).is_err());
    }

    #[test]
    fn test_to_throw() {
        let throws = Value::function("explode", || Err(Thrown::new("Error: kaboom")));
        let returns = Value::function("quiet", || Ok(Value::Undefined));

        assert!(expect(throws.clone()).to_throw().is_ok());
        assert!(expect(throws.clone()).to_throw_matching("kaboom").is_ok());
        assert!(expect(throws.clone()).to_throw_matching(Value::regexp("KABOOM", "i")).is_ok());
        assert!(expect(throws).to_throw_matching("fizzle").is_err());
        assert!(expect(returns).to_throw().is_err());
        assert!(expect(5).to_throw().is_err());
    }

    #[test]
    fn test_large_values_keep_messages_bounded() {
        let big = Value::array((0..500).map(Value::from));
        let err = expect(big).to_equal(Value::array([])).unwrap_err();
        assert!(err.message().lines().count() < 2 * MAX_RENDERED_LINES + 8);
    }
}
