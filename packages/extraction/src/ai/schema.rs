//! JSON schema generation for OpenAI structured outputs.
//!
//! OpenAI strict mode requires `additionalProperties: false` on every object
//! schema, all properties listed in `required`, and fully inlined schemas
//! (no `$ref`). This massages `schemars` output into that shape.

use schemars::{schema_for, JsonSchema};
use serde_json::Value;

/// Generate an OpenAI-strict-mode-compatible schema for `T`.
pub fn openai_schema<T: JsonSchema>() -> Value {
    let schema = schema_for!(T);
    let mut value = serde_json::to_value(schema).unwrap_or_default();

    let definitions = value
        .get("definitions")
        .cloned()
        .unwrap_or(Value::Object(Default::default()));

    fix_object_schemas(&mut value);
    inline_refs(&mut value, &definitions);

    if let Value::Object(map) = &mut value {
        map.remove("definitions");
        map.remove("$schema");
    }
    value
}

// Adds additionalProperties: false and a full required list to every object.
fn fix_object_schemas(value: &mut Value) {
    match value {
        Value::Object(map) => {
            if map.get("type") == Some(&Value::String("object".to_string())) {
                map.insert("additionalProperties".to_string(), Value::Bool(false));
                if let Some(Value::Object(props)) = map.get("properties") {
                    let all_keys: Vec<Value> =
                        props.keys().map(|k| Value::String(k.clone())).collect();
                    map.insert("required".to_string(), Value::Array(all_keys));
                }
            }
            for child in map.values_mut() {
                fix_object_schemas(child);
            }
        }
        Value::Array(items) => {
            for item in items {
                fix_object_schemas(item);
            }
        }
        _ => {}
    }
}

// Replaces {"$ref": "#/definitions/X"} with the (fixed) definition body.
fn inline_refs(value: &mut Value, definitions: &Value) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(reference)) = map.get("$ref") {
                if let Some(name) = reference.strip_prefix("#/definitions/") {
                    if let Some(mut definition) = definitions.get(name).cloned() {
                        fix_object_schemas(&mut definition);
                        inline_refs(&mut definition, definitions);
                        *value = definition;
                        return;
                    }
                }
            }
            for child in map.values_mut() {
                inline_refs(child, definitions);
            }
        }
        Value::Array(items) => {
            for item in items {
                inline_refs(item, definitions);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::extractor::ExtractionResponse;

    #[test]
    fn response_schema_is_strict_and_inlined() {
        let schema = openai_schema::<ExtractionResponse>();
        let as_text = schema.to_string();

        assert!(!as_text.contains("$ref"));
        assert_eq!(schema["additionalProperties"], Value::Bool(false));

        let required = schema["required"].as_array().unwrap();
        assert!(required.contains(&Value::String("entities".to_string())));
        assert!(required.contains(&Value::String("relationships".to_string())));
    }
}
