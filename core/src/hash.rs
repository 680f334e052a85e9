use fnv::FnvHasher;
use itertools::Itertools;
use serde::Serialize;
use serde_json::Value;
use std::hash::Hasher;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("Failed to serialize value for hashing: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// FNV-1a 64 over a structural walk of the JSON form of `value`, with object
/// keys in sorted order. Rendered as lowercase hex.
pub fn hash<T: Serialize + ?Sized>(value: &T) -> Result<String, HashError> {
    let value = serde_json::to_value(value)?;
    let mut hasher = FnvHasher::default();
    write_value(&mut hasher, &value);
    Ok(format!("{:x}", hasher.finish()))
}

fn write_value(hasher: &mut FnvHasher, value: &Value) {
    match value {
        Value::Null => hasher.write_u8(0),
        Value::Bool(b) => {
            hasher.write_u8(1);
            hasher.write_u8(u8::from(*b));
        }
        Value::Number(n) => {
            hasher.write_u8(2);
            write_str(hasher, &n.to_string());
        }
        Value::String(s) => {
            hasher.write_u8(3);
            write_str(hasher, s);
        }
        Value::Array(items) => {
            hasher.write_u8(4);
            write_len(hasher, items.len());
            for item in items {
                write_value(hasher, item);
            }
        }
        Value::Object(map) => {
            hasher.write_u8(5);
            write_len(hasher, map.len());
            for (key, item) in map.iter().sorted_by(|(a, _), (b, _)| a.cmp(b)) {
                write_str(hasher, key);
                write_value(hasher, item);
            }
        }
    }
}

fn write_str(hasher: &mut FnvHasher, s: &str) {
    write_len(hasher, s.len());
    hasher.write(s.as_bytes());
}

// Length prefixes keep ["ab", "c"] and ["a", "bc"] apart.
fn write_len(hasher: &mut FnvHasher, len: usize) {
    hasher.write_u64(u64::try_from(len).unwrap_or(u64::MAX));
}

#[cfg(test)]
mod tests {
    use super::*;
    use assertables::assert_ok;
    use proptest::prelude::*;
    use serde_json::json;
    use std::collections::{BTreeMap, HashMap};

    #[test]
    fn test_hash_is_stable() {
        let first = assert_ok!(hash("foo"));
        let second = assert_ok!(hash("foo"));
        assert_eq!(first, second);
    }

    #[test]
    fn test_hash_differs_for_different_input() {
        let foo = assert_ok!(hash("foo"));
        let bar = assert_ok!(hash("bar"));
        assert_ne!(foo, bar);
    }

    #[test]
    fn test_hash_is_hex() {
        let digest = assert_ok!(hash(&json!({ "host": "example.com", "port": 80 })));
        assert!(!digest.is_empty());
        assert!(digest.len() <= 16);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_hash_separates_nested_strings() {
        let a = assert_ok!(hash(&["ab", "c"]));
        let b = assert_ok!(hash(&["a", "bc"]));
        assert_ne!(a, b);
    }

    #[test]
    fn test_hash_distinguishes_types() {
        let number = assert_ok!(hash(&json!(80)));
        let string = assert_ok!(hash(&json!("80")));
        assert_ne!(number, string);
    }

    proptest! {
        #[test]
        fn test_hash_ignores_map_order(entries in proptest::collection::vec(("[a-z]{1,8}", 0i64..1000), 0..16)) {
            let hashed: HashMap<_, _> = entries.iter().cloned().collect();
            let ordered: BTreeMap<_, _> = entries.iter().cloned().collect();

            prop_assert_eq!(hash(&hashed).ok(), hash(&ordered).ok());
        }
    }
}
