//! Extraction of numeric view counts from automation results.
//!
//! Automation workflows return loosely-typed JSON whose layout depends on the
//! workflow that produced it. This crate probes a fixed list of payload shapes
//! and candidate keys, then normalises the value it finds into an integer.
//!
//! ```
//! use serde_json::json;
//!
//! let payload = json!({ "result": { "data": { "播放量": "1,692.14万" } } });
//! assert_eq!(view_parser::extract_views(&payload), Some(16_921_400));
//! ```

mod keys;
mod shape;
mod value;

pub use keys::VIEW_COUNT_KEYS;
pub use shape::{PayloadShape, SHAPES};
pub use value::{parse_count, parse_count_str};

use serde_json::Value;
use tracing::trace;

/// Extract the view count from an automation result payload.
///
/// Shapes are visited in [`SHAPES`] order and, within each data object, keys in
/// [`VIEW_COUNT_KEYS`] order. The first key that is present and holds a
/// parseable value wins. `None` means nothing usable was found, which callers
/// must treat as a failure rather than zero.
pub fn extract_views(payload: &Value) -> Option<u64> {
    ViewCountParser::default().extract(payload)
}

/// Configurable form of [`extract_views`].
#[derive(Debug, Clone)]
pub struct ViewCountParser {
    shapes: &'static [PayloadShape],
    keys: Vec<String>,
}

impl Default for ViewCountParser {
    fn default() -> Self {
        Self {
            shapes: SHAPES,
            keys: VIEW_COUNT_KEYS.iter().map(|k| k.to_string()).collect(),
        }
    }
}

impl ViewCountParser {
    /// Create a parser that searches `keys` (highest priority first).
    pub fn with_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            shapes: SHAPES,
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    /// Candidate keys in priority order.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Run the shape/key probe against `payload`.
    pub fn extract(&self, payload: &Value) -> Option<u64> {
        for shape in self.shapes {
            for data in (shape.locate)(payload) {
                let Some(object) = data.as_object() else {
                    continue;
                };

                for key in &self.keys {
                    let Some(raw) = object.get(key.as_str()) else {
                        continue;
                    };

                    match parse_count(raw) {
                        Some(views) => {
                            trace!(shape = shape.name, key = %key, views, "view count located");
                            return Some(views);
                        }
                        None => {
                            trace!(shape = shape.name, key = %key, value = %raw, "unparseable view count");
                        }
                    }
                }
            }
        }

        None
    }
}
