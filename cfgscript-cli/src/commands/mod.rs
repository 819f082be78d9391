//! CLI commands

pub mod run;

use std::path::Path;

/// Parse `KEY=VALUE`; the value is JSON when it parses, otherwise a string
pub fn parse_var(arg: &str) -> Result<(String, serde_json::Value), String> {
    let (key, value) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {:?}", arg))?;
    if key.is_empty() {
        return Err(format!("empty variable name in {:?}", arg));
    }
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

/// The path as the loader expects it
pub(crate) fn path_str(path: &Path) -> anyhow::Result<&str> {
    path.to_str()
        .ok_or_else(|| anyhow::anyhow!("path is not valid UTF-8: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_var_json_values() {
        assert_eq!(parse_var("port=8080").unwrap(), ("port".to_string(), json!(8080)));
        assert_eq!(parse_var("debug=true").unwrap(), ("debug".to_string(), json!(true)));
        assert_eq!(
            parse_var("hosts=[\"a\",\"b\"]").unwrap(),
            ("hosts".to_string(), json!(["a", "b"]))
        );
    }

    #[test]
    fn test_parse_var_falls_back_to_string() {
        assert_eq!(parse_var("env=prod").unwrap(), ("env".to_string(), json!("prod")));
        assert_eq!(parse_var("expr=a=b").unwrap(), ("expr".to_string(), json!("a=b")));
        assert_eq!(parse_var("empty=").unwrap(), ("empty".to_string(), json!("")));
    }

    #[test]
    fn test_parse_var_rejects_malformed() {
        assert!(parse_var("novalue").is_err());
        assert!(parse_var("=1").is_err());
    }
}
