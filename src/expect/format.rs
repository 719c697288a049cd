use super::value::Value;

/// Rendered values longer than this are elided in the middle.
pub const MAX_RENDERED_LINES: usize = 16;

/// Containers nested deeper than this render as `[Array]` / `[Object]`.
pub const MAX_RENDERED_DEPTH: usize = 32;

const INDENT: &str = "  ";

/// Renders a value the way a failure message shows it, bounded to
/// [`MAX_RENDERED_LINES`].
pub fn render(value: &Value) -> String {
    elide(&render_full(value), MAX_RENDERED_LINES)
}

pub fn render_full(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value, 0);
    out
}

pub fn render_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 && n.is_sign_negative() {
        "-0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{}", n as i128)
    } else {
        format!("{}", n)
    }
}

/// Keeps the first and last lines of `text` so the result never exceeds
/// `max_lines`.
pub fn elide(text: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() <= max_lines || max_lines < 3 {
        return text.to_string();
    }

    let kept = max_lines - 1;
    let head = kept / 2 + kept % 2;
    let tail = kept / 2;
    let omitted = lines.len() - head - tail;

    let mut out: Vec<String> = lines[..head].iter().map(|l| l.to_string()).collect();
    out.push(format!("... {} lines omitted ...", omitted));
    out.extend(lines[lines.len() - tail..].iter().map(|l| l.to_string()));
    out.join("\n")
}

fn write_value(out: &mut String, value: &Value, depth: usize) {
    match value {
        Value::Undefined => out.push_str("undefined"),
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&render_number(*n)),
        Value::BigInt(digits) => {
            out.push_str(digits);
            out.push('n');
        }
        Value::String(s) => out.push_str(&quote(s)),
        Value::Symbol(symbol) => {
            out.push_str("Symbol(");
            out.push_str(&symbol.description);
            out.push(')');
        }
        Value::RegExp(re) => {
            out.push('/');
            out.push_str(&re.source);
            out.push('/');
            out.push_str(&re.flags);
        }
        Value::Function(f) => {
            out.push_str("[Function ");
            out.push_str(f.display_name());
            out.push(']');
        }
        Value::Circular => out.push_str("[Circular]"),
        Value::Array(items) => {
            if items.is_empty() {
                out.push_str("[]");
                return;
            }
            if depth >= MAX_RENDERED_DEPTH {
                out.push_str("[Array]");
                return;
            }
            out.push_str("[\n");
            for (i, item) in items.iter().enumerate() {
                push_indent(out, depth + 1);
                write_value(out, item, depth + 1);
                if i + 1 < items.len() {
                    out.push(',');
                }
                out.push('\n');
            }
            push_indent(out, depth);
            out.push(']');
        }
        Value::Object(object) => {
            if let Some(class) = &object.class {
                out.push_str(class);
                if let Some(repr) = &object.repr {
                    out.push(' ');
                    out.push_str(repr);
                }
                if object.entries.is_empty() {
                    return;
                }
                out.push(' ');
            }
            if object.entries.is_empty() {
                out.push_str("{}");
                return;
            }
            if depth >= MAX_RENDERED_DEPTH {
                out.push_str("[Object]");
                return;
            }
            out.push_str("{\n");
            for (i, (key, item)) in object.entries.iter().enumerate() {
                push_indent(out, depth + 1);
                out.push_str(&quote(key));
                out.push_str(": ");
                write_value(out, item, depth + 1);
                if i + 1 < object.entries.len() {
                    out.push(',');
                }
                out.push('\n');
            }
            push_indent(out, depth);
            out.push('}');
        }
    }
}

fn quote(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{}\"", s))
}

fn push_indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
}
