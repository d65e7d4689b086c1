use serde_json::Value;

pub fn str_param<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(|v| v.as_str())
}

/// Numeric params may arrive as JSON numbers or as strings typed into a UI
/// field; both count, anything else reads as absent.
pub fn num_param(params: &Value, key: &str) -> Option<f64> {
    match params.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}
