//! Decoding of JavaScript values sent by the sandbox's expectation shim.
//!
//! The shim flattens every object-like value into a node table indexed by
//! id; containers refer to their children by id. The JSON therefore stays
//! shallow however deep the value is, and a node referenced twice decodes
//! to the same `Rc`, keeping `===` semantics.

use std::collections::HashMap;
use std::rc::Rc;

use serde::Deserialize;

use crate::error::WireError;
use crate::expect::{Object, Thrown, Value};

/// Deepest value the decoder rebuilds.
pub const MAX_DEPTH: usize = 1_000;

/// An inline value: a primitive or a reference into the node table.
#[derive(Debug, Deserialize)]
#[serde(tag = "t", rename_all = "lowercase")]
enum Leaf {
    Undefined,
    Null,
    Bool { v: bool },
    Number { v: String },
    Bigint { v: String },
    String { v: String },
    Ref { id: usize },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "t", rename_all = "lowercase")]
enum Node {
    Symbol {
        v: String,
    },
    Function {
        name: String,
    },
    Regexp {
        source: String,
        flags: String,
    },
    Array {
        items: Vec<Leaf>,
    },
    Object {
        plain: bool,
        class: Option<String>,
        repr: Option<String>,
        entries: Vec<(String, Leaf)>,
    },
}

#[derive(Debug, Deserialize)]
struct ThrowOutcome {
    threw: bool,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct WirePayload {
    #[serde(default)]
    nodes: Vec<Node>,
    received: Leaf,
    args: Vec<Leaf>,
    #[serde(default)]
    outcome: Option<ThrowOutcome>,
}

/// One matcher call: the received value and the matcher arguments.
#[derive(Debug)]
pub struct Payload {
    pub received: Value,
    pub args: Vec<Value>,
}

pub fn decode_payload(raw: &str) -> Result<Payload, WireError> {
    let wire: WirePayload = serde_json::from_str(raw)?;
    let mut decoder = Decoder::new(wire.nodes);

    let mut received = decoder.leaf(wire.received, 0)?;
    let args = wire
        .args
        .into_iter()
        .map(|arg| decoder.leaf(arg, 0))
        .collect::<Result<Vec<_>, _>>()?;

    // A function under `toThrow` was already called inside the sandbox;
    // replay what it did.
    if let Some(outcome) = wire.outcome {
        if let Value::Function(callable) = &received {
            let name = callable.name.clone();
            received = if outcome.threw {
                let message = outcome.message;
                Value::function(name, move || Err(Thrown::new(message.clone())))
            } else {
                Value::function(name, || Ok(Value::Undefined))
            };
        }
    }

    Ok(Payload { received, args })
}

/// Rebuilds nodes on first reference. A node whose slot is already taken
/// but not finished is an ancestor of the current one, so the reference
/// closes a cycle.
struct Decoder {
    pending: Vec<Option<Node>>,
    built: HashMap<usize, Value>,
}

impl Decoder {
    fn new(nodes: Vec<Node>) -> Self {
        Self {
            pending: nodes.into_iter().map(Some).collect(),
            built: HashMap::new(),
        }
    }

    fn leaf(&mut self, leaf: Leaf, depth: usize) -> Result<Value, WireError> {
        Ok(match leaf {
            Leaf::Undefined => Value::Undefined,
            Leaf::Null => Value::Null,
            Leaf::Bool { v } => Value::Bool(v),
            Leaf::Number { v } => Value::Number(parse_number(&v)),
            Leaf::Bigint { v } => Value::BigInt(v),
            Leaf::String { v } => Value::String(v),
            Leaf::Ref { id } => return self.node(id, depth),
        })
    }

    fn node(&mut self, id: usize, depth: usize) -> Result<Value, WireError> {
        if let Some(value) = self.built.get(&id) {
            return Ok(value.clone());
        }
        if depth >= MAX_DEPTH {
            return Err(WireError::TooDeep(MAX_DEPTH));
        }
        let node = match self.pending.get_mut(id) {
            Some(slot) => slot.take(),
            None => return Err(WireError::UnknownNode(id)),
        };
        let Some(node) = node else {
            return Ok(Value::Circular);
        };

        let value = match node {
            Node::Symbol { v } => Value::symbol(v),
            Node::Function { name } => {
                Value::function(name, || Err(Thrown::new("functions cannot be called outside the sandbox")))
            }
            Node::Regexp { source, flags } => Value::regexp(source, flags),
            Node::Array { items } => {
                let items = items
                    .into_iter()
                    .map(|item| self.leaf(item, depth + 1))
                    .collect::<Result<Vec<_>, _>>()?;
                Value::from(items)
            }
            Node::Object {
                plain,
                class,
                repr,
                entries,
            } => {
                let entries = entries
                    .into_iter()
                    .map(|(key, item)| Ok((key, self.leaf(item, depth + 1)?)))
                    .collect::<Result<Vec<_>, WireError>>()?;
                let class = if plain { None } else { Some(class.unwrap_or_else(|| "Object".to_string())) };
                Value::Object(Rc::new(Object { class, entries, repr }))
            }
        };
        self.built.insert(id, value.clone());
        Ok(value)
    }
}

fn parse_number(text: &str) -> f64 {
    match text {
        "NaN" => f64::NAN,
        "Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        "-0" => -0.0,
        other => other.parse().unwrap_or(f64::NAN),
    }
}
