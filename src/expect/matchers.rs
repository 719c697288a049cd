use std::fmt;

use regex::{Regex, RegexBuilder};

use super::equality::{deep_equals, strict_equals};
use super::format::{render, render_number};
use super::value::{RegExp, Value};
use super::AssertionError;

/// The closed set of matchers an expectation supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Matcher {
    ToBe,
    ToEqual,
    ToBeGreaterThan,
    ToBeGreaterThanOrEqual,
    ToBeLessThan,
    ToBeLessThanOrEqual,
    ToMatch,
    ToHaveProperty,
    ToBeTruthy,
    ToBeFalsy,
    ToBeCloseTo,
    ToBeDefined,
    ToContain,
    ToThrow,
}

impl Matcher {
    pub const ALL: [Matcher; 14] = [
        Matcher::ToBe,
        Matcher::ToEqual,
        Matcher::ToBeGreaterThan,
        Matcher::ToBeGreaterThanOrEqual,
        Matcher::ToBeLessThan,
        Matcher::ToBeLessThanOrEqual,
        Matcher::ToMatch,
        Matcher::ToHaveProperty,
        Matcher::ToBeTruthy,
        Matcher::ToBeFalsy,
        Matcher::ToBeCloseTo,
        Matcher::ToBeDefined,
        Matcher::ToContain,
        Matcher::ToThrow,
    ];

    /// Method name exposed to test code.
    pub fn name(self) -> &'static str {
        match self {
            Matcher::ToBe => "toBe",
            Matcher::ToEqual => "toEqual",
            Matcher::ToBeGreaterThan => "toBeGreaterThan",
            Matcher::ToBeGreaterThanOrEqual => "toBeGreaterThanOrEqual",
            Matcher::ToBeLessThan => "toBeLessThan",
            Matcher::ToBeLessThanOrEqual => "toBeLessThanOrEqual",
            Matcher::ToMatch => "toMatch",
            Matcher::ToHaveProperty => "toHaveProperty",
            Matcher::ToBeTruthy => "toBeTruthy",
            Matcher::ToBeFalsy => "toBeFalsy",
            Matcher::ToBeCloseTo => "toBeCloseTo",
            Matcher::ToBeDefined => "toBeDefined",
            Matcher::ToContain => "toContain",
            Matcher::ToThrow => "toThrow",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|m| m.name() == name)
    }

    /// Parameter list shown in failure headers.
    pub fn params(self) -> &'static str {
        match self {
            Matcher::ToBe | Matcher::ToEqual => "expected",
            Matcher::ToBeGreaterThan
            | Matcher::ToBeGreaterThanOrEqual
            | Matcher::ToBeLessThan
            | Matcher::ToBeLessThanOrEqual => "expected",
            Matcher::ToMatch => "expected",
            Matcher::ToHaveProperty => "path, value?",
            Matcher::ToBeTruthy | Matcher::ToBeFalsy | Matcher::ToBeDefined => "",
            Matcher::ToBeCloseTo => "expected, precision?",
            Matcher::ToContain => "item",
            Matcher::ToThrow => "expected?",
        }
    }

    pub(crate) fn header(self, negated: bool) -> String {
        let not = if negated { ".not" } else { "" };
        format!("expect(received){}.{}({})", not, self.name(), self.params())
    }

    pub(crate) fn check(self, received: &Value, args: &[Value]) -> Result<(), AssertionError> {
        let arg = |i: usize| args.get(i).unwrap_or(&Value::Undefined);
        match self {
            Matcher::ToBe => to_be(received, arg(0)),
            Matcher::ToEqual => to_equal(received, arg(0)),
            Matcher::ToBeGreaterThan => compare(self, received, arg(0), |a, b| a > b, ">"),
            Matcher::ToBeGreaterThanOrEqual => compare(self, received, arg(0), |a, b| a >= b, ">="),
            Matcher::ToBeLessThan => compare(self, received, arg(0), |a, b| a < b, "<"),
            Matcher::ToBeLessThanOrEqual => compare(self, received, arg(0), |a, b| a <= b, "<="),
            Matcher::ToMatch => to_match(received, arg(0)),
            Matcher::ToHaveProperty => to_have_property(received, arg(0), args.get(1)),
            Matcher::ToBeTruthy => boolean(self, received, true),
            Matcher::ToBeFalsy => boolean(self, received, false),
            Matcher::ToBeCloseTo => to_be_close_to(received, arg(0), args.get(1)),
            Matcher::ToBeDefined => to_be_defined(received),
            Matcher::ToContain => to_contain(received, arg(0)),
            Matcher::ToThrow => to_throw(received, args.first()),
        }
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn failure(matcher: Matcher, body: String) -> AssertionError {
    AssertionError::new(format!("{}\n\n{}", matcher.header(false), body))
}

fn expected_received(matcher: Matcher, expected: &Value, received: &Value) -> AssertionError {
    failure(
        matcher,
        format!("Expected: {}\nReceived: {}", render(expected), render(received)),
    )
}

fn to_be(received: &Value, expected: &Value) -> Result<(), AssertionError> {
    if strict_equals(received, expected) {
        return Ok(());
    }
    let mut err = expected_received(Matcher::ToBe, expected, received);
    if deep_equals(received, expected) {
        err.append("\nIf it should pass with deep equality, replace \"toBe\" with \"toEqual\"");
    }
    Err(err)
}

fn to_equal(received: &Value, expected: &Value) -> Result<(), AssertionError> {
    if deep_equals(received, expected) {
        Ok(())
    } else {
        Err(expected_received(Matcher::ToEqual, expected, received))
    }
}

fn require_number(matcher: Matcher, role: &str, value: &Value) -> Result<f64, AssertionError> {
    value.as_number().ok_or_else(|| {
        failure(
            matcher,
            format!(
                "{} value must be a number.\n{} has type {}: {}",
                capitalize(role),
                capitalize(role),
                value.type_name(),
                render(value)
            ),
        )
    })
}

fn compare(
    matcher: Matcher,
    received: &Value,
    expected: &Value,
    holds: fn(f64, f64) -> bool,
    operator: &str,
) -> Result<(), AssertionError> {
    let actual = require_number(matcher, "received", received)?;
    let bound = require_number(matcher, "expected", expected)?;
    if holds(actual, bound) {
        Ok(())
    } else {
        Err(failure(
            matcher,
            format!(
                "Expected: {} {}\nReceived:   {}",
                operator,
                render_number(bound),
                render_number(actual)
            ),
        ))
    }
}

/// Builds a JS regular expression with its `i`, `m` and `s` flags. A
/// pattern the regex engine cannot express fails the matcher.
fn pattern(matcher: Matcher, re: &RegExp) -> Result<Regex, AssertionError> {
    RegexBuilder::new(&re.source)
        .case_insensitive(re.flags.contains('i'))
        .multi_line(re.flags.contains('m'))
        .dot_matches_new_line(re.flags.contains('s'))
        .build()
        .map_err(|e| {
            failure(
                matcher,
                format!("Expected pattern /{}/{} is not supported: {}", re.source, re.flags, e),
            )
        })
}

fn to_match(received: &Value, expected: &Value) -> Result<(), AssertionError> {
    let text = received.as_str().ok_or_else(|| {
        failure(
            Matcher::ToMatch,
            format!(
                "Received value must be a string.\nReceived has type {}: {}",
                received.type_name(),
                render(received)
            ),
        )
    })?;

    let matched = match expected {
        Value::String(needle) => text.contains(needle.as_str()),
        Value::RegExp(re) => {
            pattern(Matcher::ToMatch, re)?.is_match(text)
        }
        other => {
            return Err(failure(
                Matcher::ToMatch,
                format!(
                    "Expected value must be a string or regular expression.\nExpected has type {}: {}",
                    other.type_name(),
                    render(other)
                ),
            ))
        }
    };

    if matched {
        Ok(())
    } else {
        let label = if matches!(expected, Value::RegExp(_)) { "pattern" } else { "substring" };
        Err(failure(
            Matcher::ToMatch,
            format!("Expected {}: {}\nReceived string:  {}", label, render(expected), render(received)),
        ))
    }
}

#[derive(Debug, Clone, PartialEq)]
enum PathSegment {
    Key(String),
    Index(usize),
}

fn parse_path(path: &Value) -> Result<Vec<PathSegment>, AssertionError> {
    let segments = match path {
        Value::String(dotted) => dotted
            .split('.')
            .map(|part| PathSegment::Key(part.to_string()))
            .collect::<Vec<_>>(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(key) => Ok(PathSegment::Key(key.clone())),
                Value::Number(n) if *n >= 0.0 && n.fract() == 0.0 => Ok(PathSegment::Index(*n as usize)),
                other => Err(failure(
                    Matcher::ToHaveProperty,
                    format!("Path entries must be strings or non-negative integers, got {}", render(other)),
                )),
            })
            .collect::<Result<Vec<_>, _>>()?,
        other => {
            return Err(failure(
                Matcher::ToHaveProperty,
                format!(
                    "Expected path must be a string or an array.\nPath has type {}: {}",
                    other.type_name(),
                    render(other)
                ),
            ))
        }
    };

    if segments.is_empty() || segments == [PathSegment::Key(String::new())] {
        return Err(failure(Matcher::ToHaveProperty, "Expected path must not be empty".to_string()));
    }
    Ok(segments)
}

fn lookup(value: &Value, segment: &PathSegment) -> Option<Value> {
    let key = match segment {
        PathSegment::Index(i) => i.to_string(),
        PathSegment::Key(k) => k.clone(),
    };
    match value {
        Value::Object(object) => object.get(&key).cloned(),
        Value::Array(items) => {
            if key == "length" {
                return Some(Value::Number(items.len() as f64));
            }
            key.parse::<usize>().ok().and_then(|i| items.get(i).cloned())
        }
        Value::String(s) => {
            if key == "length" {
                return Some(Value::Number(s.encode_utf16().count() as f64));
            }
            // Indices count UTF-16 code units; half a surrogate pair reads
            // back as U+FFFD.
            key.parse::<usize>()
                .ok()
                .and_then(|i| s.encode_utf16().nth(i))
                .map(|unit| Value::String(String::from_utf16_lossy(&[unit])))
        }
        _ => None,
    }
}

fn to_have_property(received: &Value, path: &Value, expected: Option<&Value>) -> Result<(), AssertionError> {
    let segments = parse_path(path)?;

    let mut current = received.clone();
    for (depth, segment) in segments.iter().enumerate() {
        match lookup(&current, segment) {
            Some(next) => current = next,
            None => {
                return Err(failure(
                    Matcher::ToHaveProperty,
                    format!(
                        "Expected path: {}\nReceived path: {}\nReceived value: {}",
                        render(path),
                        render_segments(&segments[..depth]),
                        render(received)
                    ),
                ))
            }
        }
    }

    match expected {
        Some(expected) if !deep_equals(&current, expected) => Err(failure(
            Matcher::ToHaveProperty,
            format!(
                "Expected path: {}\nExpected value: {}\nReceived value: {}",
                render(path),
                render(expected),
                render(&current)
            ),
        )),
        _ => Ok(()),
    }
}

fn render_segments(segments: &[PathSegment]) -> String {
    if segments.is_empty() {
        return "[]".to_string();
    }
    segments
        .iter()
        .map(|s| match s {
            PathSegment::Key(k) => k.clone(),
            PathSegment::Index(i) => i.to_string(),
        })
        .collect::<Vec<_>>()
        .join(".")
}

fn boolean(matcher: Matcher, received: &Value, want: bool) -> Result<(), AssertionError> {
    if received.is_truthy() == want {
        Ok(())
    } else {
        Err(failure(matcher, format!("Received: {}", render(received))))
    }
}

fn to_be_close_to(received: &Value, expected: &Value, precision: Option<&Value>) -> Result<(), AssertionError> {
    let matcher = Matcher::ToBeCloseTo;
    let target = require_number(matcher, "expected", expected)?;
    let actual = require_number(matcher, "received", received)?;
    let digits = match precision {
        None | Some(Value::Undefined) => 2.0,
        Some(value) => require_number(matcher, "precision", value)?,
    };

    let pass = if target.is_infinite() && actual.is_infinite() {
        target == actual
    } else {
        (target - actual).abs() < 10f64.powf(-digits) / 2.0
    };

    if pass {
        Ok(())
    } else {
        Err(failure(
            matcher,
            format!(
                "Expected: {}\nReceived: {}\n\nExpected precision:    {}\nExpected difference: < {}\nReceived difference:   {}",
                render_number(target),
                render_number(actual),
                render_number(digits),
                render_number(10f64.powf(-digits) / 2.0),
                render_number((target - actual).abs())
            ),
        ))
    }
}

fn to_be_defined(received: &Value) -> Result<(), AssertionError> {
    if received.is_undefined() {
        Err(failure(Matcher::ToBeDefined, format!("Received: {}", render(received))))
    } else {
        Ok(())
    }
}

fn to_contain(received: &Value, item: &Value) -> Result<(), AssertionError> {
    let found = match (received, item) {
        (Value::Array(items), _) => items.iter().any(|candidate| strict_equals(candidate, item)),
        (Value::String(haystack), Value::String(needle)) => haystack.contains(needle.as_str()),
        (Value::String(_), other) => {
            return Err(failure(
                Matcher::ToContain,
                format!(
                    "Expected value must be a string if received value is a string.\nExpected has type {}: {}",
                    other.type_name(),
                    render(other)
                ),
            ))
        }
        (other, _) => {
            return Err(failure(
                Matcher::ToContain,
                format!(
                    "Received value must be an array or a string.\nReceived has type {}: {}",
                    other.type_name(),
                    render(other)
                ),
            ))
        }
    };

    if found {
        Ok(())
    } else {
        Err(failure(
            Matcher::ToContain,
            format!("Expected item: {}\nReceived: {}", render(item), render(received)),
        ))
    }
}

fn to_throw(received: &Value, expected: Option<&Value>) -> Result<(), AssertionError> {
    let callable = match received {
        Value::Function(callable) => callable,
        other => {
            return Err(failure(
                Matcher::ToThrow,
                format!(
                    "Received value must be a function.\nReceived has type {}: {}",
                    other.type_name(),
                    render(other)
                ),
            ))
        }
    };

    let thrown = match callable.call() {
        Ok(_) => return Err(failure(Matcher::ToThrow, "Received function did not throw".to_string())),
        Err(thrown) => thrown,
    };

    let matched = match expected {
        None | Some(Value::Undefined) => true,
        Some(Value::String(needle)) => thrown.message.contains(needle.as_str()),
        Some(Value::RegExp(re)) => pattern(Matcher::ToThrow, re)?.is_match(&thrown.message),
        Some(other) => {
            return Err(failure(
                Matcher::ToThrow,
                format!(
                    "Expected value must be a string or regular expression.\nExpected has type {}: {}",
                    other.type_name(),
                    render(other)
                ),
            ))
        }
    };

    if matched {
        Ok(())
    } else {
        Err(failure(
            Matcher::ToThrow,
            format!(
                "Expected message: {}\nReceived message: {}",
                render(expected.unwrap_or(&Value::Undefined)),
                render(&Value::String(thrown.message))
            ),
        ))
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
