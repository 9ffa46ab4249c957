pub mod resolve;
pub mod source;
pub mod transform;

use serde_json::Value;

/// Selects the provider in the internal schema.
pub const KMS_TYPE_KEY: &str = "encryptionKMSType";
/// Selects the provider in the standard (environment-variable style) schema.
pub const KMS_PROVIDER_KEY: &str = "KMS_PROVIDER";
/// Nested map of per-tenant overrides inside a KMS configuration section.
pub const TENANTS_KEY: &str = "tenants";
/// Names the configuration resource a tenant keeps in its own namespace.
pub const TENANT_CONFIG_NAME_KEY: &str = "tenantConfigName";
pub const TENANT_CONFIG_NAME_DEFAULT: &str = "csi-kms-config";

/// Reads a scalar configuration value as a string.
///
/// Strings are returned as is, booleans and numbers are formatted. Nested maps,
/// arrays and nulls have no string form.
pub fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Parses the boolean spellings accepted in configuration documents.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

/// Reads a configuration value as a boolean, accepting JSON booleans and their
/// string spellings.
pub fn value_to_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => parse_bool(s),
        Value::Number(n) => match n.as_u64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    #[rstest]
    #[case(json!("true"), Some(true))]
    #[case(json!("False"), Some(false))]
    #[case(json!(true), Some(true))]
    #[case(json!(0), Some(false))]
    #[case(json!("yes"), None)]
    #[case(json!({"nested": true}), None)]
    fn test_value_to_bool(#[case] value: Value, #[case] expected: Option<bool>) {
        assert_eq!(value_to_bool(&value), expected);
    }

    #[test]
    fn test_value_to_string() {
        assert_eq!(value_to_string(&json!("abc")), Some("abc".into()));
        assert_eq!(value_to_string(&json!(false)), Some("false".into()));
        assert_eq!(value_to_string(&json!(8200)), Some("8200".into()));
        assert_eq!(value_to_string(&json!({})), None);
        assert_eq!(value_to_string(&Value::Null), None);
    }
}
