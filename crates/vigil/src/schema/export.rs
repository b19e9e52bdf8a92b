//! JSON-Schema export for admin form rendering.
//!
//! The exported document describes the *current* config version only; secret
//! fields are flagged so the rendering layer masks them and stored values are
//! never echoed back in plaintext.

use schemars::JsonSchema;
use serde_json::Value;

/// Generate a JSON-Schema document for `T`'s current shape
pub fn schema_document<T: JsonSchema>() -> Value {
    let root = schemars::r#gen::SchemaGenerator::default().into_root_schema_for::<T>();
    serde_json::to_value(root).unwrap_or(Value::Null)
}

/// Flag secret-valued properties in an exported schema document.
///
/// Marked properties get `writeOnly` and `x-secret`, and any `default` or
/// `examples` values are stripped so no secret material leaks through the
/// export path.
pub fn flag_secret_fields(doc: &mut Value, secret_fields: &[&str]) {
    let Some(properties) = doc.get_mut("properties").and_then(Value::as_object_mut) else {
        return;
    };
    for (name, property) in properties.iter_mut() {
        if !secret_fields.contains(&name.as_str()) {
            continue;
        }
        if let Some(object) = property.as_object_mut() {
            object.insert("writeOnly".into(), Value::Bool(true));
            object.insert("x-secret".into(), Value::Bool(true));
            object.remove("default");
            object.remove("examples");
        }
    }
}
