//! Schema validation helpers for Snaplog JSON5 configuration.

use crate::ConfigError;
use serde_json::{Map, Value};

/// Validate a single config layer against the schema.
pub(super) fn validate_layer_schema(value: &Value, layer: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, "")?;
    ensure_allowed_keys(
        map,
        &["$schema", "generation", "throttle", "pipeline", "timeline"],
        layer,
        "",
    )?;

    if let Some(value) = map.get("$schema") {
        expect_string(value, layer, "$schema")?;
    }
    if let Some(value) = map.get("generation") {
        validate_generation(value, layer, "generation")?;
    }
    if let Some(value) = map.get("throttle") {
        validate_throttle(value, layer, "throttle")?;
    }
    if let Some(value) = map.get("pipeline") {
        validate_pipeline(value, layer, "pipeline")?;
    }
    if let Some(value) = map.get("timeline") {
        let map = expect_object(value, layer, "timeline")?;
        ensure_allowed_keys(map, &["utc_offset_minutes"], layer, "timeline")?;
        if let Some(value) = map.get("utc_offset_minutes") {
            expect_i64(value, layer, "timeline.utc_offset_minutes")?;
        }
    }

    Ok(())
}

/// Validate the "generation" block.
fn validate_generation(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(
        map,
        &[
            "base_url",
            "api_key_env",
            "timeout_secs",
            "vision_model",
            "text_model",
            "alt_text_model",
            "max_tokens",
            "temperatures",
            "draft_top_p",
        ],
        layer,
        path,
    )?;

    for key in ["base_url", "api_key_env", "vision_model", "text_model"] {
        if let Some(value) = map.get(key) {
            expect_string(value, layer, &join_path(path, key))?;
        }
    }
    if let Some(value) = map.get("alt_text_model") {
        expect_optional_string(value, layer, &join_path(path, "alt_text_model"))?;
    }
    for key in ["timeout_secs", "max_tokens"] {
        if let Some(value) = map.get(key) {
            expect_u64(value, layer, &join_path(path, key))?;
        }
    }
    if let Some(value) = map.get("draft_top_p")
        && !value.is_null()
    {
        expect_f64(value, layer, &join_path(path, "draft_top_p"))?;
    }
    if let Some(value) = map.get("temperatures") {
        let temperatures_path = join_path(path, "temperatures");
        let temperatures = expect_object(value, layer, &temperatures_path)?;
        let keys = ["observation", "draft", "refine", "summary_lines"];
        ensure_allowed_keys(temperatures, &keys, layer, &temperatures_path)?;
        for key in keys {
            if let Some(value) = temperatures.get(key) {
                expect_f64(value, layer, &join_path(&temperatures_path, key))?;
            }
        }
    }
    Ok(())
}

/// Validate the "throttle" block.
fn validate_throttle(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    let keys = ["min_interval_ms", "max_wait_ms", "backoff_cap_multiplier"];
    ensure_allowed_keys(map, &keys, layer, path)?;
    for key in keys {
        if let Some(value) = map.get(key) {
            expect_u64(value, layer, &join_path(path, key))?;
        }
    }
    Ok(())
}

/// Validate the "pipeline" block.
fn validate_pipeline(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(
        map,
        &["max_images", "default_tone", "cross_validation", "refine"],
        layer,
        path,
    )?;

    if let Some(value) = map.get("max_images") {
        expect_u64(value, layer, &join_path(path, "max_images"))?;
    }
    if let Some(value) = map.get("default_tone") {
        expect_string(value, layer, &join_path(path, "default_tone"))?;
    }
    if let Some(value) = map.get("cross_validation") {
        let cv_path = join_path(path, "cross_validation");
        let cv = expect_object(value, layer, &cv_path)?;
        ensure_allowed_keys(cv, &["enabled", "min_score", "keywords"], layer, &cv_path)?;
        if let Some(value) = cv.get("enabled") {
            expect_bool(value, layer, &join_path(&cv_path, "enabled"))?;
        }
        if let Some(value) = cv.get("min_score") {
            expect_f64(value, layer, &join_path(&cv_path, "min_score"))?;
        }
        if let Some(value) = cv.get("keywords") {
            validate_string_array(value, layer, &join_path(&cv_path, "keywords"))?;
        }
    }
    if let Some(value) = map.get("refine") {
        let refine_path = join_path(path, "refine");
        let refine = expect_object(value, layer, &refine_path)?;
        ensure_allowed_keys(refine, &["enabled", "min_chars"], layer, &refine_path)?;
        if let Some(value) = refine.get("enabled") {
            expect_bool(value, layer, &join_path(&refine_path, "enabled"))?;
        }
        if let Some(value) = refine.get("min_chars") {
            expect_u64(value, layer, &join_path(&refine_path, "min_chars"))?;
        }
    }
    Ok(())
}

/// Expect a JSON object or return a typed error.
fn expect_object<'a>(
    value: &'a Value,
    layer: &str,
    path: &str,
) -> Result<&'a Map<String, Value>, ConfigError> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(invalid_field(layer, path, "expected object")),
    }
}

fn expect_string(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    if value.is_string() {
        Ok(())
    } else {
        Err(invalid_field(layer, path, "expected string"))
    }
}

fn expect_optional_string(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    if value.is_string() || value.is_null() {
        Ok(())
    } else {
        Err(invalid_field(layer, path, "expected string or null"))
    }
}

fn expect_bool(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    if value.is_boolean() {
        Ok(())
    } else {
        Err(invalid_field(layer, path, "expected bool"))
    }
}

/// Non-negative integers only.
fn expect_u64(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    if value.is_u64() {
        Ok(())
    } else {
        Err(invalid_field(layer, path, "expected non-negative integer"))
    }
}

fn expect_i64(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    if value.is_i64() || value.is_u64() {
        Ok(())
    } else {
        Err(invalid_field(layer, path, "expected integer"))
    }
}

fn expect_f64(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    if value.is_number() {
        Ok(())
    } else {
        Err(invalid_field(layer, path, "expected number"))
    }
}

/// Validate that a value is an array of strings.
fn validate_string_array(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let Value::Array(items) = value else {
        return Err(invalid_field(layer, path, "expected array"));
    };
    for (idx, entry) in items.iter().enumerate() {
        if !entry.is_string() {
            return Err(invalid_field(
                layer,
                &format!("{path}[{idx}]"),
                "expected string",
            ));
        }
    }
    Ok(())
}

/// Ensure an object contains only allowed keys.
fn ensure_allowed_keys(
    map: &Map<String, Value>,
    allowed: &[&str],
    layer: &str,
    path: &str,
) -> Result<(), ConfigError> {
    match map.keys().find(|key| !allowed.contains(&key.as_str())) {
        Some(key) => Err(invalid_field(layer, &join_path(path, key), "unknown key")),
        None => Ok(()),
    }
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

fn invalid_field(layer: &str, path: &str, message: &str) -> ConfigError {
    let path = if path.is_empty() { "root" } else { path };
    ConfigError::field(format!("{layer}:{path}"), message)
}
