//! Cache namespaces and content-derived keys.

use std::fmt;
use std::str::FromStr;

use sha2::{Digest, Sha256};
use ytx_models::extract_youtube_id;

/// Logical partition of the cache. Each namespace has its own TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Cheap-to-refetch source content (transcripts)
    Raw,
    /// Expensive model output
    Derived,
}

impl Namespace {
    pub const ALL: [Namespace; 2] = [Namespace::Raw, Namespace::Derived];

    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Raw => "raw",
            Namespace::Derived => "derived",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Namespace {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raw" | "transcript" => Ok(Namespace::Raw),
            "derived" | "llm" => Ok(Namespace::Derived),
            other => Err(format!("unknown cache namespace: {}", other)),
        }
    }
}

/// Deterministic key for one cache entry.
///
/// The digest covers the namespace and every part of the key material, each
/// length-prefixed so that `["ab", "c"]` and `["a", "bc"]` never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    namespace: Namespace,
    digest: String,
}

impl CacheKey {
    /// Build a key from arbitrary key material.
    pub fn new(namespace: Namespace, material: &[&str]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(namespace.as_str().as_bytes());
        for part in material {
            hasher.update((part.len() as u64).to_le_bytes());
            hasher.update(part.as_bytes());
        }
        Self {
            namespace,
            digest: format!("{:x}", hasher.finalize()),
        }
    }

    /// Key for raw content fetched for `input_ref`.
    ///
    /// Uses the YouTube video id when one can be extracted so that different
    /// URL spellings of the same video share an entry.
    pub fn raw(input_ref: &str) -> Self {
        let resource = extract_youtube_id(input_ref).unwrap_or_else(|_| input_ref.trim().to_string());
        Self::new(Namespace::Raw, &[&resource])
    }

    /// Key for a derived result.
    ///
    /// `prompt` identifies the instructions given to the model, `content` is
    /// the input it saw and `model_id` the exact model. All three change the
    /// output, so all three are part of the key.
    pub fn derived(prompt: &str, content: &str, model_id: &str) -> Self {
        let content = normalize_content(content);
        Self::new(Namespace::Derived, &[prompt, &content, model_id.trim()])
    }

    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    /// Hex-encoded SHA-256 digest.
    pub fn digest(&self) -> &str {
        &self.digest
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, &self.digest[..12])
    }
}

/// Unify line endings and trim outer whitespace.
pub fn normalize_content(content: &str) -> String {
    content.replace("\r\n", "\n").trim().to_string()
}
