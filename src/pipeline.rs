use crate::challenge::{Challenge, ChallengeType};
use crate::compiler::{self, Dialect};
use crate::error::CompileError;
use crate::expect::Matcher;

const EXPECT_PRELUDE: &str = include_str!("sandbox/js/expect.js");
const HARNESS_PRELUDE: &str = include_str!("sandbox/js/harness.js");
const REACT_PRELUDE: &str = include_str!("sandbox/js/react.js");

/// The page a challenge runs in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentShell {
    Bare,
    /// Carries a `<div id="root"></div>` for rendered components.
    MountRoot,
    /// The challenge's own markup.
    Markup(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub shell: DocumentShell,
    pub script: String,
}

impl Document {
    pub fn to_html(&self) -> String {
        let body = match &self.shell {
            DocumentShell::Bare => String::new(),
            DocumentShell::MountRoot => "<div id=\"root\"></div>\n".to_string(),
            DocumentShell::Markup(markup) => format!("{}\n", markup),
        };
        format!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n</head>\n<body>\n{}<script>\n{}\n</script>\n</body>\n</html>\n",
            body,
            escape_script(&self.script)
        )
    }
}

fn escape_script(script: &str) -> String {
    let lower = script.to_ascii_lowercase();
    let mut out = String::with_capacity(script.len());
    let mut last = 0;
    for (at, _) in lower.match_indices("</script") {
        out.push_str(&script[last..at]);
        out.push_str("<\\/");
        last = at + 2;
    }
    out.push_str(&script[last..]);
    out
}

#[derive(Debug, Clone)]
pub struct PreparedChallenge {
    pub document: Document,
    /// Module specifiers removed from the source, in order of appearance.
    pub imports: Vec<String>,
}

/// Turns a challenge into one self-contained document.
pub fn prepare(challenge: &Challenge) -> Result<PreparedChallenge, CompileError> {
    let (source, dialect, shell, markup) = match challenge.kind {
        ChallengeType::Typescript => (combined(challenge), Dialect::TypeScript, DocumentShell::Bare, None),
        ChallengeType::React => (combined(challenge), Dialect::Tsx, DocumentShell::MountRoot, None),
        ChallengeType::Markup => {
            let markup = challenge.code().to_string();
            (
                challenge.test_code.clone(),
                Dialect::TypeScript,
                DocumentShell::Markup(markup.clone()),
                Some(markup),
            )
        }
        other => return Err(CompileError::NotExecutable(other)),
    };

    let compiled = compiler::compile(&source, dialect)?;
    if !compiled.imports.is_empty() {
        log::debug!("challenge {} imports {:?}", challenge.id, compiled.imports);
    }

    let script = assemble_script(
        &compiled.code,
        markup.as_deref(),
        challenge.kind == ChallengeType::React,
    );

    Ok(PreparedChallenge {
        document: Document { shell, script },
        imports: compiled.imports,
    })
}

fn combined(challenge: &Challenge) -> String {
    format!("{}\n{}", challenge.code(), challenge.test_code)
}

/// Concatenates the preludes and the compiled challenge code. The challenge
/// code sees `console` and `markup` as parameters, never as host globals.
pub fn assemble_script(compiled: &str, markup: Option<&str>, with_react: bool) -> String {
    let names: Vec<&str> = Matcher::ALL.iter().map(|m| m.name()).collect();
    let names = serde_json::to_string(&names).unwrap_or_else(|_| "[]".to_string());
    let markup = match markup {
        Some(text) => serde_json::to_string(text).unwrap_or_else(|_| "\"\"".to_string()),
        None => "null".to_string(),
    };

    let mut script = String::with_capacity(
        EXPECT_PRELUDE.len() + HARNESS_PRELUDE.len() + REACT_PRELUDE.len() + compiled.len() + 256,
    );
    script.push_str(&format!("var __matcherNames = {};\n", names));
    script.push_str(EXPECT_PRELUDE);
    script.push('\n');
    script.push_str(HARNESS_PRELUDE);
    script.push('\n');
    if with_react {
        script.push_str(REACT_PRELUDE);
        script.push('\n');
    }
    script.push_str(&format!("var __markup = {};\n", markup));
    script.push_str("(function (console, markup) {\n");
    script.push_str(compiled);
    script.push_str("\n})(__createConsole(), __markup);\n");
    script
}
