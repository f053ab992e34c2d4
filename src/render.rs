//! Capture extraction and message template rendering.
//!
//! Templates use `{name}` tokens that refer to named capture groups. `{{` and
//! `}}` produce literal braces. Rendering never fails: a token without a
//! capture renders as the empty string and is reported as a `RenderWarning`.

use std::collections::BTreeMap;
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Named captures of one matched line, ordered by name.
pub type Captures = BTreeMap<String, String>;

/// Extracts every named group that participated in the match.
///
/// Returns `None` when the pattern does not match `line`.
#[must_use]
pub fn extract(pattern: &Regex, line: &str) -> Option<Captures> {
    let caps = pattern.captures(line)?;
    let mut out = Captures::new();
    for name in pattern.capture_names().flatten() {
        if let Some(m) = caps.name(name) {
            out.insert(name.to_string(), m.as_str().to_string());
        }
    }
    Some(out)
}

/// A template token that had no corresponding capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderWarning {
    /// Template that was rendered.
    pub template: String,
    /// Token name without braces.
    pub name: String,
}

impl fmt::Display for RenderWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "template '{}' references missing capture '{}'", self.template, self.name)
    }
}

/// Output of `render`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    /// The substituted message.
    pub text: String,
    /// Tokens that rendered as the empty string.
    pub warnings: Vec<RenderWarning>,
}

enum Piece<'a> {
    Literal(&'a str),
    Token(&'a str),
}

fn pieces(template: &str) -> Vec<Piece<'_>> {
    let mut out = Vec::new();
    let bytes = template.as_bytes();
    let mut literal_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'{' if bytes.get(i + 1) == Some(&b'{') => {
                out.push(Piece::Literal(&template[literal_start..i + 1]));
                i += 2;
                literal_start = i;
            }
            b'}' if bytes.get(i + 1) == Some(&b'}') => {
                out.push(Piece::Literal(&template[literal_start..i + 1]));
                i += 2;
                literal_start = i;
            }
            b'{' => match template[i + 1..].find('}') {
                Some(len) => {
                    out.push(Piece::Literal(&template[literal_start..i]));
                    out.push(Piece::Token(template[i + 1..i + 1 + len].trim()));
                    i += len + 2;
                    literal_start = i;
                }
                // Unterminated token stays literal.
                None => break,
            },
            _ => i += 1,
        }
    }

    out.push(Piece::Literal(&template[literal_start..]));
    out
}

/// Names referenced by `{name}` tokens, in order of appearance.
#[must_use]
pub fn template_names(template: &str) -> Vec<&str> {
    pieces(template)
        .into_iter()
        .filter_map(|piece| match piece {
            Piece::Token(name) => Some(name),
            Piece::Literal(_) => None,
        })
        .collect()
}

/// Substitutes every `{name}` token in `template` with its capture value.
#[must_use]
pub fn render(template: &str, captures: &Captures) -> Rendered {
    let mut text = String::with_capacity(template.len());
    let mut warnings = Vec::new();

    for piece in pieces(template) {
        match piece {
            Piece::Literal(s) => text.push_str(s),
            Piece::Token(name) => match captures.get(name) {
                Some(value) => text.push_str(value),
                None => warnings.push(RenderWarning {
                    template: template.to_string(),
                    name: name.to_string(),
                }),
            },
        }
    }

    Rendered { text, warnings }
}
