//! Content keys and cached-function identifiers
//!
//! A [`ContentKey`] is derived from the canonical JSON encoding of a call's
//! positional and keyword arguments. Object keys are sorted before hashing, so
//! two calls whose arguments differ only in map ordering share a key. The
//! positional and keyword collections are hashed separately and joined with
//! `:`, which keeps `f(a=1)` and `f({"a": 1})` apart.

use crate::error::ArgumentKind;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fmt;

/// Separator between the positional and keyword digests
pub const KEY_SEPARATOR: char = ':';

/// Length of one hex-encoded SHA-256 digest
const DIGEST_HEX_LEN: usize = 64;

/// Deterministic identifier of one set of call arguments
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentKey(String);

impl ContentKey {
    /// Compute the key for positional `args` and keyword `kwargs`.
    ///
    /// `args` is expected to serialize to a sequence and `kwargs` to a map,
    /// but any serializable value is accepted.
    pub fn new<A, K>(args: &A, kwargs: &K) -> Result<Self>
    where
        A: Serialize + ?Sized,
        K: Serialize + ?Sized,
    {
        let positional = canonical_digest(args, ArgumentKind::Positional)?;
        let keyword = canonical_digest(kwargs, ArgumentKind::Keyword)?;
        Ok(Self(format!("{positional}{KEY_SEPARATOR}{keyword}")))
    }

    /// Compute the key for a call without keyword arguments
    pub fn from_args<A>(args: &A) -> Result<Self>
    where
        A: Serialize + ?Sized,
    {
        Self::new(args, &Map::new())
    }

    /// Parse a key read back from disk (e.g. an entry directory name)
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let (positional, keyword) = raw.split_once(KEY_SEPARATOR)?;
        if is_digest(positional) && is_digest(keyword) {
            Some(Self(raw.to_string()))
        } else {
            None
        }
    }

    /// The full key as stored on disk
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Digest of the positional arguments
    #[must_use]
    pub fn positional_digest(&self) -> &str {
        self.0
            .split_once(KEY_SEPARATOR)
            .map_or(self.0.as_str(), |(p, _)| p)
    }

    /// Digest of the keyword arguments
    #[must_use]
    pub fn keyword_digest(&self) -> &str {
        self.0.split_once(KEY_SEPARATOR).map_or("", |(_, k)| k)
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ContentKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn is_digest(s: &str) -> bool {
    s.len() == DIGEST_HEX_LEN && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Hash the canonical JSON text of `value`
fn canonical_digest<T>(value: &T, part: ArgumentKind) -> Result<String>
where
    T: Serialize + ?Sized,
{
    let json = serde_json::to_value(value).map_err(|e| Error::unhashable(part, e.to_string()))?;
    let bytes = serde_json::to_vec(&canonicalize(json))
        .map_err(|e| Error::unhashable(part, e.to_string()))?;
    Ok(hex::encode(Sha256::digest(bytes)))
}

/// Rebuild every object with its keys in sorted order.
///
/// serde_json keeps insertion order when its `preserve_order` feature is
/// enabled anywhere in the build, so sorting is done explicitly.
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::with_capacity(entries.len());
            for (k, v) in entries {
                sorted.insert(k, canonicalize(v));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

/// Identifier of a cached function; names its directory under the cache root
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FunctionId(String);

impl FunctionId {
    /// Validate and wrap a qualified function name such as `plugins.calculate_dotplot`
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() || name == "." || name == ".." {
            return Err(Error::configuration(format!(
                "invalid cached function name: {name:?}"
            )));
        }
        if name.contains(['/', '\\', '\0']) {
            return Err(Error::configuration(format!(
                "cached function name must not contain path separators: {name:?}"
            )));
        }
        Ok(Self(name))
    }

    /// Build an identifier from a Rust module path and a function name.
    ///
    /// `FunctionId::qualified(module_path!(), "calculate_dotplot")` yields
    /// `ogb_jobs.tools.dotplot.calculate_dotplot`.
    pub fn qualified(module_path: &str, function: &str) -> Result<Self> {
        Self::new(format!("{}.{function}", module_path.replace("::", ".")))
    }

    /// The name as used on disk
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for FunctionId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<FunctionId> for String {
    fn from(value: FunctionId) -> Self {
        value.0
    }
}
