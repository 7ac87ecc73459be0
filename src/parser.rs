//! Raw export parser for bike-share trip exports.
//!
//! Two layouts are accepted: a single JSON document with the rides under an
//! envelope array, or JSON objects concatenated back to back (optionally
//! comma separated). The envelope layout is tried first.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

/// Default envelope field holding the ride array.
pub const DEFAULT_ENVELOPE_KEY: &str = "walletOperations";

/// Which layout the raw text turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    Envelope,
    Concatenated,
}

/// Raw objects pulled out of an export, in document order.
#[derive(Debug)]
pub struct Extraction {
    pub format: ExportFormat,
    pub objects: Vec<Value>,
    pub parse_errors: usize,
}

impl Extraction {
    pub fn extracted(&self) -> usize {
        self.objects.len()
    }
}

/// Splits export text into raw ride objects.
///
/// A failed whole-document parse only selects the concatenated strategy; it
/// is never reported as an error. Inside the concatenated layout each
/// malformed span is skipped and counted in [`Extraction::parse_errors`].
pub fn extract_objects(text: &str, envelope_key: &str) -> Extraction {
    if let Some(objects) = try_envelope(text, envelope_key) {
        debug!(count = objects.len(), envelope_key, "Envelope layout detected");
        return Extraction {
            format: ExportFormat::Envelope,
            objects,
            parse_errors: 0,
        };
    }

    let mut objects = Vec::new();
    let mut parse_errors = 0;

    for (index, span) in object_spans(text).into_iter().enumerate() {
        match span {
            Span::Complete(raw) => match serde_json::from_str::<Value>(raw) {
                Ok(value) => objects.push(value),
                Err(e) => {
                    parse_errors += 1;
                    warn!(index, error = %e, "Skipping malformed object");
                }
            },
            Span::Unterminated(offset) => {
                parse_errors += 1;
                warn!(offset, "Skipping unterminated object at end of input");
            }
        }
    }

    debug!(
        count = objects.len(),
        parse_errors, "Concatenated layout extracted"
    );

    Extraction {
        format: ExportFormat::Concatenated,
        objects,
        parse_errors,
    }
}

fn try_envelope(text: &str, envelope_key: &str) -> Option<Vec<Value>> {
    let mut doc: Value = serde_json::from_str(text).ok()?;
    match doc.get_mut(envelope_key)?.take() {
        Value::Array(items) => Some(items),
        _ => None,
    }
}

#[derive(Debug, PartialEq)]
enum Span<'a> {
    Complete(&'a str),
    Unterminated(usize),
}

/// Finds top-level balanced `{...}` spans, ignoring braces inside string
/// literals.
fn object_spans(text: &str) -> Vec<Span<'_>> {
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, b) in text.bytes().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' if depth > 0 => in_string = true,
            b'{' => {
                if depth == 0 {
                    start = i;
                }
                depth += 1;
            }
            b'}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    spans.push(Span::Complete(&text[start..=i]));
                }
            }
            _ => {}
        }
    }

    if depth > 0 {
        spans.push(Span::Unterminated(start));
    }

    spans
}
