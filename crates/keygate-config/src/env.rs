//! Environment variable fallback and `${VAR}` reference resolution.
//!
//! Env vars are a fallback, not an override: they only fill fields that no
//! config file set.

use std::collections::HashMap;
use std::fmt::Write as _;

use tracing::debug;

use crate::merge::{ConfigLayer, FieldSources};

/// Mapping from environment variable name to config field path.
struct EnvMapping {
    var_name: &'static str,
    field_path: &'static str,
}

const ENV_MAPPINGS: &[EnvMapping] = &[
    EnvMapping {
        var_name: "KEYGATE_LOG_LEVEL",
        field_path: "logging.level",
    },
    EnvMapping {
        var_name: "KEYGATE_CONSISTENCY_MARGIN",
        field_path: "consistency.required_margin",
    },
    EnvMapping {
        var_name: "KEYGATE_POLL_INTERVAL_MS",
        field_path: "consistency.poll_interval_ms",
    },
    EnvMapping {
        var_name: "KEYGATE_AUTH_DOMAIN",
        field_path: "auth.domain",
    },
    // Endpoint variable used by existing ERC-20 deployment scripts.
    EnvMapping {
        var_name: "ERC20_CHAIN_RPC_URL",
        field_path: "chains.ethereum.rpc_url",
    },
];

/// Apply environment variable fallbacks to fields that no config file set.
///
/// Returns the number of env vars applied.
pub fn apply_env_fallbacks<S: ::std::hash::BuildHasher>(
    merged: &mut toml::Value,
    sources: &mut FieldSources,
    env_vars: &HashMap<String, String, S>,
) -> usize {
    let mut count: usize = 0;

    for mapping in ENV_MAPPINGS {
        if sources
            .get(mapping.field_path)
            .is_some_and(ConfigLayer::is_file)
        {
            continue;
        }

        if let Some(val) = env_vars.get(mapping.var_name) {
            debug!(
                var = mapping.var_name,
                field = mapping.field_path,
                "applying env var fallback"
            );

            set_field_from_string(merged, mapping.field_path, val);
            sources.insert(mapping.field_path.to_owned(), ConfigLayer::Environment);
            count = count.saturating_add(1);
        }
    }

    count
}

/// Resolve `${VAR}` references within string values in the config tree.
///
/// References that don't resolve are left as-is.
pub fn resolve_env_references<S: ::std::hash::BuildHasher>(
    val: &mut toml::Value,
    env_vars: &HashMap<String, String, S>,
) {
    match val {
        toml::Value::String(s) => {
            *s = resolve_string_refs(s, env_vars);
        },
        toml::Value::Table(table) => {
            for (_, child) in table.iter_mut() {
                resolve_env_references(child, env_vars);
            }
        },
        toml::Value::Array(arr) => {
            for child in arr.iter_mut() {
                resolve_env_references(child, env_vars);
            }
        },
        _ => {},
    }
}

fn resolve_string_refs<S: ::std::hash::BuildHasher>(
    input: &str,
    env_vars: &HashMap<String, String, S>,
) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' || chars.peek() != Some(&'{') {
            result.push(ch);
            continue;
        }
        chars.next();

        let mut var_name = String::new();
        let mut closed = false;
        for ch in chars.by_ref() {
            if ch == '}' {
                closed = true;
                break;
            }
            var_name.push(ch);
        }

        if !closed || var_name.is_empty() {
            // Malformed reference, keep the text.
            result.push_str("${");
            result.push_str(&var_name);
            if closed {
                result.push('}');
            }
        } else if let Some(val) = env_vars.get(&var_name) {
            result.push_str(val);
        } else {
            debug!(var = var_name, "unresolved env var reference in config");
            let _ = write!(result, "${{{var_name}}}");
        }
    }

    result
}

/// Set a dotted field in the TOML tree, creating intermediate tables.
fn set_field_from_string(root: &mut toml::Value, path: &str, val: &str) {
    let toml_val = coerce_to_toml_value(path, val);

    let Some((parents, leaf)) = path.rsplit_once('.') else {
        if let Some(table) = root.as_table_mut() {
            table.insert(path.to_owned(), toml_val);
        }
        return;
    };

    let mut current = root;
    for segment in parents.split('.') {
        let Some(table) = current.as_table_mut() else {
            return;
        };
        current = table
            .entry(segment.to_owned())
            .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
    }

    if let Some(table) = current.as_table_mut() {
        table.insert(leaf.to_owned(), toml_val);
    }
}

/// Coerce a string env var value to the TOML type of the target field.
fn coerce_to_toml_value(path: &str, val: &str) -> toml::Value {
    if matches!(
        path,
        "consistency.required_margin" | "consistency.poll_interval_ms"
    ) && let Ok(i) = val.trim().parse::<i64>()
    {
        return toml::Value::Integer(i);
    }

    toml::Value::String(val.to_owned())
}

/// Collect all current environment variables into a map.
#[must_use]
pub fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn test_apply_env_fallbacks() {
        let mut merged: toml::Value = toml::from_str("[logging]\nlevel = \"info\"").unwrap();
        let mut sources = FieldSources::new();
        sources.insert("logging.level".to_owned(), ConfigLayer::Defaults);
        let env = make_env(&[("KEYGATE_LOG_LEVEL", "debug")]);

        let count = apply_env_fallbacks(&mut merged, &mut sources, &env);

        assert_eq!(count, 1);
        assert_eq!(merged["logging"]["level"].as_str().unwrap(), "debug");
        assert_eq!(
            sources.get("logging.level"),
            Some(&ConfigLayer::Environment)
        );
    }

    #[test]
    fn test_env_fallback_skips_file_set_fields() {
        let mut merged: toml::Value = toml::from_str("[logging]\nlevel = \"warn\"").unwrap();
        let mut sources = FieldSources::new();
        sources.insert("logging.level".to_owned(), ConfigLayer::User);

        let env = make_env(&[("KEYGATE_LOG_LEVEL", "debug")]);
        let count = apply_env_fallbacks(&mut merged, &mut sources, &env);

        assert_eq!(count, 0);
        assert_eq!(merged["logging"]["level"].as_str().unwrap(), "warn");
    }

    #[test]
    fn test_rpc_url_fallback_creates_chain_table() {
        let mut merged: toml::Value = toml::from_str("[chains]").unwrap();
        let mut sources = FieldSources::new();
        let env = make_env(&[("ERC20_CHAIN_RPC_URL", "https://rpc.example.org")]);

        apply_env_fallbacks(&mut merged, &mut sources, &env);

        assert_eq!(
            merged["chains"]["ethereum"]["rpc_url"].as_str().unwrap(),
            "https://rpc.example.org"
        );
    }

    #[test]
    fn test_margin_is_coerced_to_integer() {
        let mut merged: toml::Value = toml::from_str("[consistency]").unwrap();
        let mut sources = FieldSources::new();
        let env = make_env(&[("KEYGATE_CONSISTENCY_MARGIN", "6")]);

        apply_env_fallbacks(&mut merged, &mut sources, &env);

        assert_eq!(
            merged["consistency"]["required_margin"].as_integer(),
            Some(6)
        );
    }

    #[test]
    fn test_resolve_env_references() {
        let mut val: toml::Value =
            toml::from_str("[chains.ethereum]\nrpc_url = \"https://${RPC_HOST}/v1\"").unwrap();
        let env = make_env(&[("RPC_HOST", "node.example.org")]);
        resolve_env_references(&mut val, &env);

        assert_eq!(
            val["chains"]["ethereum"]["rpc_url"].as_str().unwrap(),
            "https://node.example.org/v1"
        );
    }

    #[test]
    fn test_resolve_env_references_unresolved() {
        let mut val: toml::Value = toml::from_str("[auth]\ndomain = \"${MISSING_VAR}\"").unwrap();
        resolve_env_references(&mut val, &HashMap::new());

        assert_eq!(val["auth"]["domain"].as_str().unwrap(), "${MISSING_VAR}");
    }

    #[test]
    fn test_malformed_reference_left_alone() {
        let env = make_env(&[("A", "x")]);
        assert_eq!(resolve_string_refs("cost ${A", &env), "cost ${A");
        assert_eq!(resolve_string_refs("${}", &env), "${}");
        assert_eq!(resolve_string_refs("$A ${A}", &env), "$A x");
    }
}
