use serde::{Deserialize, Deserializer};

/// Deserialize an optional identifier that the server may send either as a
/// JSON string or as a number. `current_task` is a string on the push channel
/// but is occasionally serialized straight from an integer task id.
pub fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

/// Distinguish an absent key from an explicit `null`.
///
/// Use together with `#[serde(default)]`: a missing key leaves the field at
/// `None`, while `"key": null` becomes `Some(None)`. Shallow merges rely on
/// this so that a patch can clear a field without clearing the ones it omits.
pub fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
