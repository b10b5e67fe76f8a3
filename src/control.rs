//! Reassembly of the fragmented JSON control stream.

use serde_json::error::Category;
use serde_json::{Map, Value};

use crate::error::ControlError;

/// Longest fragment kept while waiting for an object to close.
pub const MAX_FRAGMENT_LEN: usize = 4096;

/// Rebuilds JSON objects from control-channel fragments and merges them into
/// a running info map.
///
/// The headset splits replies such as the `v1` device-info object across
/// several notifications (`{"fw":"1.`, `2.13","hw":`, `"03.1"}`).  Text is
/// appended one character at a time and every `}` triggers a parse of the
/// whole fragment:
///
/// * parsed object: its keys overwrite the info map and the fragment is cleared;
/// * input ended too early (a `}` closing a nested object): keep accumulating;
/// * anything else: the fragment is discarded and the error reported.
///
/// A fragment that grows past [`MAX_FRAGMENT_LEN`] without completing is
/// discarded and reported the same way.
///
/// Keys are only ever added or overwritten, never removed.
///
/// ```
/// # use muse_session::control::ControlReassembler;
/// let mut acc = ControlReassembler::new();
/// acc.feed(r#"{"fw":"1."#).unwrap();
/// assert!(acc.info().is_empty());
/// acc.feed(r#"2.13"}"#).unwrap();
/// assert_eq!(acc.info()["fw"], "1.2.13");
/// assert_eq!(acc.fragment(), "");
/// ```
#[derive(Debug, Default, Clone)]
pub struct ControlReassembler {
    fragment: String,
    info: Map<String, Value>,
}

impl ControlReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a decoded fragment, returning how many objects were merged.
    ///
    /// A malformed object does not stop processing: the rest of `text` is still
    /// consumed and the first error is returned afterwards.
    pub fn feed(&mut self, text: &str) -> Result<usize, ControlError> {
        let mut merged = 0;
        let mut first_err = None;

        for ch in text.chars() {
            self.fragment.push(ch);
            if self.fragment.len() > MAX_FRAGMENT_LEN {
                let fragment = std::mem::take(&mut self.fragment);
                first_err.get_or_insert(ControlError::MalformedFragment {
                    fragment,
                    reason: format!("no complete object within {MAX_FRAGMENT_LEN} bytes"),
                });
                continue;
            }
            if ch != '}' {
                continue;
            }
            match serde_json::from_str::<Map<String, Value>>(&self.fragment) {
                Ok(object) => {
                    self.fragment.clear();
                    self.info.extend(object);
                    merged += 1;
                }
                Err(e) if e.classify() == Category::Eof => {}
                Err(e) => {
                    let fragment = std::mem::take(&mut self.fragment);
                    first_err.get_or_insert(ControlError::MalformedFragment {
                        fragment,
                        reason: e.to_string(),
                    });
                }
            }
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(merged),
        }
    }

    /// Merged key/value pairs from every object received so far.
    pub fn info(&self) -> &Map<String, Value> {
        &self.info
    }

    /// Text received since the last complete or discarded object.
    pub fn fragment(&self) -> &str {
        &self.fragment
    }

    /// Drop any half-received object, keeping the info map.
    pub fn reset_fragment(&mut self) {
        self.fragment.clear();
    }
}
