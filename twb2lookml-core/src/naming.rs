//! Deterministic, content-addressed identifiers.
//!
//! An identifier is `<slug>_<hash>`: the slug makes it readable, the SHA-256
//! prefix of the canonical content makes it stable across runs and processes.
//! A [`Namespace`] is scoped to one run and resolves the rare case where two
//! distinct canonical strings still land on the same identifier.

use crate::config::NamingConfig;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::LazyLock;

static NON_IDENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

/// Lowercase, underscore-separated, starts with a letter, at most `max_len`
/// characters before the digit guard.
pub fn slugify(human: &str, max_len: usize) -> String {
    let lowered = human.to_lowercase();
    let replaced = NON_IDENT.replace_all(&lowered, "_");
    let trimmed = replaced.trim_matches('_');
    let truncated: String = trimmed.chars().take(max_len.max(1)).collect();
    let slug = truncated.trim_end_matches('_');

    if slug.is_empty() {
        "x".to_string()
    } else if slug.starts_with(|c: char| c.is_ascii_digit()) {
        format!("x_{}", slug)
    } else {
        slug.to_string()
    }
}

/// Full SHA-256 hex digest of the canonical string.
pub fn content_hash(canonical: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hex prefix of [`content_hash`], `len` clamped to the digest length.
pub fn short_hash(canonical: &str, len: usize) -> String {
    let mut hash = content_hash(canonical);
    hash.truncate(len.clamp(1, 64));
    hash
}

/// Identifier without collision handling.
pub fn identifier(human: &str, canonical: &str, config: &NamingConfig) -> String {
    format!(
        "{}_{}",
        slugify(human, config.max_slug_len),
        short_hash(canonical, config.hash_len)
    )
}

/// Run-scoped identifier registry. Single writer: it is owned by the run
/// context and claimed through `&mut`.
#[derive(Debug, Clone, Default)]
pub struct Namespace {
    config: NamingConfig,
    /// Base identifier to the canonical strings that produced it, first-seen first.
    produced_by: BTreeMap<String, Vec<String>>,
    /// Canonical string to its final identifier.
    assigned: HashMap<String, String>,
    taken: HashSet<String>,
}

impl Namespace {
    pub fn new(config: NamingConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Identifier for `canonical`, readable part taken from `human`.
    ///
    /// The same canonical string always gets the same identifier. A second
    /// distinct canonical string that lands on an already-taken identifier
    /// gets `_2`, the third `_3`, and so on.
    pub fn claim(&mut self, human: &str, canonical: &str) -> String {
        let base = identifier(human, canonical, &self.config);
        self.register(base, canonical.to_string())
    }

    /// Un-hashed identifier through the same collision policy.
    pub fn claim_plain(&mut self, name: &str) -> String {
        let base = slugify(name, self.config.max_slug_len);
        self.register(base, format!("plain:{}", name))
    }

    fn register(&mut self, base: String, canonical: String) -> String {
        if let Some(id) = self.assigned.get(&canonical) {
            return id.clone();
        }

        let producers = self.produced_by.entry(base.clone()).or_default();
        producers.push(canonical.clone());

        let mut id = base.clone();
        let mut suffix = 2usize;
        while self.taken.contains(&id) {
            id = format!("{}_{}", base, suffix);
            suffix += 1;
        }

        if id != base {
            tracing::debug!(base = %base, id = %id, "identifier collision resolved");
        }

        self.taken.insert(id.clone());
        self.assigned.insert(canonical, id.clone());
        id
    }

    /// Canonical strings that produced `base`, in claim order.
    pub fn producers(&self, base: &str) -> &[String] {
        self.produced_by
            .get(base)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.taken.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taken.is_empty()
    }
}
