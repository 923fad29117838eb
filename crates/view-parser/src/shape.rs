//! Known payload layouts.

use serde_json::Value;

/// A payload layout together with the function that locates its data objects.
#[derive(Debug, Clone, Copy)]
pub struct PayloadShape {
    /// Human-readable shape name, used in logs.
    pub name: &'static str,
    /// Returns the candidate data objects for this shape, in search order.
    pub locate: fn(&Value) -> Vec<&Value>,
}

macro_rules! shape_registry {
    ( $( $name:literal => $locate:path ),+ $(,)? ) => {
        &[
            $(
                PayloadShape {
                    name: $name,
                    locate: $locate,
                },
            )+
        ]
    };
}

/// Shapes in probe order. Adding a layout only needs a new entry here.
pub static SHAPES: &[PayloadShape] = shape_registry![
    "result.data" => nested_result_data,
    "data" => flat_data,
    "[].data" => sub_result_data,
    "root" => root_object,
];

fn nested_result_data(payload: &Value) -> Vec<&Value> {
    payload
        .get("result")
        .and_then(|result| result.get("data"))
        .into_iter()
        .collect()
}

fn flat_data(payload: &Value) -> Vec<&Value> {
    payload.get("data").into_iter().collect()
}

fn sub_result_data(payload: &Value) -> Vec<&Value> {
    let Some(items) = payload.as_array() else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            item.get("data")
                .or_else(|| item.get("result").and_then(|result| result.get("data")))
        })
        .collect()
}

fn root_object(payload: &Value) -> Vec<&Value> {
    if payload.is_object() {
        vec![payload]
    } else {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_shape_order() {
        let names: Vec<&str> = SHAPES.iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["result.data", "data", "[].data", "root"]);
    }

    #[test]
    fn test_sub_result_data_accepts_nested_result() {
        let payload = json!([
            { "result": { "data": { "views": 1 } } },
            { "data": { "views": 2 } },
            { "other": true }
        ]);
        let located = sub_result_data(&payload);
        assert_eq!(located.len(), 2);
        assert_eq!(located[0]["views"], 1);
        assert_eq!(located[1]["views"], 2);
    }

    #[test]
    fn test_non_matching_shapes_are_empty() {
        let payload = json!({ "data": 1 });
        assert!(nested_result_data(&payload).is_empty());
        assert!(sub_result_data(&payload).is_empty());
        assert!(root_object(&json!([1, 2])).is_empty());
    }
}
