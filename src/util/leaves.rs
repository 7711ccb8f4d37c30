//! Flatten arbitrarily nested config lists/mappings down to their leaf scalars.
//!
//! Filter lists (`blacklist`/`whitelist`) may be written as deeply nested YAML
//! sequences so related patterns can be grouped and commented in the config file.
//! This collects every leaf string, dropping `null`s, matching
//! `original_source/ircrssfeedbot/util/set.py`'s `leaves()`.

use serde_yaml::Value;

pub fn leaves(value: &Value) -> Vec<String> {
    let mut out = Vec::new();
    collect(value, &mut out);
    out
}

fn collect(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Null => {}
        Value::Sequence(items) => {
            for item in items {
                collect(item, out);
            }
        }
        Value::Mapping(map) => {
            for (_, v) in map {
                collect(v, out);
            }
        }
        Value::String(s) => out.push(s.clone()),
        other => out.push(
            serde_yaml::to_string(other)
                .unwrap_or_default()
                .trim()
                .to_string(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flattens_nested_sequences() {
        let yaml = "- a\n- [b, c, [d, e]]\n- null\n";
        let v: Value = serde_yaml::from_str(yaml).unwrap();
        let mut leaves_found = leaves(&v);
        leaves_found.sort();
        assert_eq!(leaves_found, vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn flattens_nested_mappings() {
        let yaml = "k1: v1\nk2:\n  k3: v2\n  k4: [v3, v4]\n";
        let v: Value = serde_yaml::from_str(yaml).unwrap();
        let mut leaves_found = leaves(&v);
        leaves_found.sort();
        assert_eq!(leaves_found, vec!["v1", "v2", "v3", "v4"]);
    }
}
