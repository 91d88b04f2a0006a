//! Parameter lookup and merging
//!
//! Parameters are nested maps addressed by dotted token paths:
//! `params.customers` reads `{"params": {"customers": ...}}`.

use serde_json::Value;
use stairwell_core::Parameters;

/// Deep merge `table` over `global`; the table's values win
pub fn merge_parameters(global: &Parameters, table: &Parameters) -> Parameters {
    let mut merged = global.clone();
    for (key, value) in table {
        match merged.get_mut(key) {
            Some(existing) => deep_merge(existing, value.clone()),
            None => {
                merged.insert(key.clone(), value.clone());
            }
        }
    }
    merged
}

/// Merge `overlay` into `base`. Objects combine key by key, anything else is replaced.
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Value at a dotted path
pub fn lookup<'a>(params: &'a Parameters, token: &str) -> Option<&'a Value> {
    let mut parts = token.split('.');
    let mut current = params.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// A token is bound unless its value is missing, null or an empty string
pub fn is_bound(params: &Parameters, token: &str) -> bool {
    match lookup(params, token) {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

/// Table name bound to a token (non-empty strings only)
pub fn table_binding<'a>(params: &'a Parameters, token: &str) -> Option<&'a str> {
    lookup(params, token)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Insert `value` at a dotted path, creating intermediate objects.
///
/// A non-object value in the way is replaced.
pub fn insert_path(params: &mut Parameters, token: &str, value: Value) {
    let mut parts: Vec<&str> = token.split('.').collect();
    let Some(last) = parts.pop() else {
        return;
    };

    if parts.is_empty() {
        params.insert(last.to_string(), value);
        return;
    }

    let first = parts.remove(0);
    let mut current = params
        .entry(first.to_string())
        .or_insert_with(|| Value::Object(Default::default()));

    for part in parts {
        if !current.is_object() {
            *current = Value::Object(Default::default());
        }
        let Value::Object(map) = current else {
            return;
        };
        current = map
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Default::default()));
    }

    if !current.is_object() {
        *current = Value::Object(Default::default());
    }
    if let Value::Object(map) = current {
        map.insert(last.to_string(), value);
    }
}

/// Complete a table name with a default prefix.
///
/// Names with fewer than three dot-separated parts get the first `3 - n`
/// parts of the prefix prepended: `orders` with `proj.shop` becomes
/// `proj.shop.orders`, `shop.orders` with `proj` becomes `proj.shop.orders`.
pub fn qualify_table_name(name: &str, default_prefix: Option<&str>) -> String {
    let Some(prefix) = default_prefix.filter(|p| !p.is_empty()) else {
        return name.to_string();
    };

    let parts = name.split('.').count();
    if parts >= 3 {
        return name.to_string();
    }

    let prefix_parts: Vec<&str> = prefix.split('.').take(3 - parts).collect();
    format!("{}.{}", prefix_parts.join("."), name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn params(value: Value) -> Parameters {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn table_parameters_win_and_objects_merge() {
        let global = params(json!({ "params": { "run_date": "2024-01-01", "env": "prod" } }));
        let table = params(json!({ "params": { "env": "dev", "customers": "customers" } }));

        let merged = merge_parameters(&global, &table);
        assert_eq!(
            Value::Object(merged.into_iter().collect()),
            json!({ "params": { "run_date": "2024-01-01", "env": "dev", "customers": "customers" } })
        );
    }

    #[test]
    fn lookup_and_bound() {
        let p = params(json!({ "params": { "a": "t", "empty": "", "nil": null, "n": 3 } }));

        assert_eq!(lookup(&p, "params.a"), Some(&json!("t")));
        assert!(lookup(&p, "params.a.b").is_none());
        assert!(lookup(&p, "other").is_none());

        assert!(is_bound(&p, "params.a"));
        assert!(is_bound(&p, "params.n"));
        assert!(!is_bound(&p, "params.empty"));
        assert!(!is_bound(&p, "params.nil"));
        assert!(!is_bound(&p, "params.missing"));
    }

    #[test]
    fn only_non_empty_strings_name_tables() {
        let p = params(json!({ "params": { "a": "t", "empty": "", "n": 3 } }));
        assert_eq!(table_binding(&p, "params.a"), Some("t"));
        assert_eq!(table_binding(&p, "params.empty"), None);
        assert_eq!(table_binding(&p, "params.n"), None);
    }

    #[test]
    fn insert_nested_path() {
        let mut p = Parameters::new();
        insert_path(&mut p, "params.a", json!(""));
        insert_path(&mut p, "params.b", json!(""));
        insert_path(&mut p, "flat", json!(""));

        assert_eq!(p["params"], json!({ "a": "", "b": "" }));
        assert_eq!(p["flat"], json!(""));
    }

    #[test]
    fn qualify_with_prefix() {
        assert_eq!(qualify_table_name("orders", Some("proj.shop")), "proj.shop.orders");
        assert_eq!(qualify_table_name("shop.orders", Some("proj.other")), "proj.shop.orders");
        assert_eq!(qualify_table_name("p.s.orders", Some("proj")), "p.s.orders");
        assert_eq!(qualify_table_name("orders", None), "orders");
        assert_eq!(qualify_table_name("orders", Some("proj")), "proj.orders");
    }
}
