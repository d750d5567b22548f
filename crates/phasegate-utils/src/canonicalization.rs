use anyhow::{Context, Result};
use blake3::Hasher;
use camino::Utf8Path;
use serde::Serialize;
use std::fs::File;
use std::io::Read;

/// Identifier of the canonical JSON scheme used for summaries and `--json` output.
pub const CANONICALIZATION_BACKEND: &str = "jcs-rfc8785";

/// Emit a value as JCS-canonical JSON (RFC 8785).
///
/// Used for run summaries, `status --json`, and JSON error reports so that
/// output is byte-stable regardless of struct field order.
///
/// ```rust
/// use phasegate_utils::canonicalization::emit_jcs;
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// struct Out {
///     value: i32,
///     name: &'static str,
/// }
///
/// let json = emit_jcs(&Out { value: 42, name: "x" }).unwrap();
/// assert_eq!(json, r#"{"name":"x","value":42}"#);
/// ```
pub fn emit_jcs<T: Serialize>(value: &T) -> Result<String> {
    let json_value =
        serde_json::to_value(value).with_context(|| "Failed to serialize value to JSON")?;
    let json_bytes = serde_json_canonicalizer::to_vec(&json_value)
        .with_context(|| "Failed to canonicalize JSON using JCS")?;
    String::from_utf8(json_bytes).with_context(|| "JCS output contained invalid UTF-8")
}

/// BLAKE3 hex digest of an in-memory buffer.
#[must_use]
pub fn hash_bytes(content: &[u8]) -> String {
    let mut hasher = Hasher::new();
    hasher.update(content);
    hasher.finalize().to_hex().to_string()
}

/// BLAKE3 hex digest of a file, streamed in fixed-size chunks.
pub fn hash_file(path: &Utf8Path) -> Result<String> {
    let mut file =
        File::open(path.as_std_path()).with_context(|| format!("Failed to open {path} for hashing"))?;
    let mut hasher = Hasher::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let read = file
            .read(&mut buf)
            .with_context(|| format!("Failed to read {path} for hashing"))?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_emit_jcs_sorts_keys() {
        let value = json!({"zeta": 1, "alpha": {"b": 2, "a": 1}});
        assert_eq!(
            emit_jcs(&value).unwrap(),
            r#"{"alpha":{"a":1,"b":2},"zeta":1}"#
        );
    }

    #[test]
    fn test_emit_jcs_is_deterministic_for_maps() {
        let mut first = HashMap::new();
        let mut second = HashMap::new();
        for (k, v) in [("one", 1), ("two", 2), ("three", 3)] {
            first.insert(k, v);
        }
        for (k, v) in [("three", 3), ("one", 1), ("two", 2)] {
            second.insert(k, v);
        }
        assert_eq!(emit_jcs(&first).unwrap(), emit_jcs(&second).unwrap());
    }

    #[test]
    fn test_hash_bytes_and_file_agree() {
        let temp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(temp.path(), b"phase artifact").unwrap();
        let path = Utf8Path::from_path(temp.path()).unwrap();

        let from_file = hash_file(path).unwrap();
        assert_eq!(from_file, hash_bytes(b"phase artifact"));
        assert_eq!(from_file.len(), 64);
    }

    #[test]
    fn test_hash_file_missing() {
        assert!(hash_file(Utf8Path::new("/definitely/not/here.json")).is_err());
    }
}
