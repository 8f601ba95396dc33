//! Cache key generation.

use crate::types::TaskType;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

/// Content address of a result: task type plus the sha256 of the normalized input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub task_type: TaskType,
    pub hash: String,
}

impl CacheKey {
    pub fn new(task_type: TaskType, hash: impl Into<String>) -> Self {
        Self {
            task_type,
            hash: hash.into(),
        }
    }
    pub fn as_str(&self) -> &str {
        &self.hash
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.task_type, self.hash)
    }
}

pub struct CacheKeyGenerator {
    case_sensitive: bool,
    salt: Option<String>,
}

impl CacheKeyGenerator {
    pub fn new() -> Self {
        Self {
            case_sensitive: true,
            salt: None,
        }
    }

    /// Bumping the salt invalidates every key, e.g. after an analyzer upgrade.
    pub fn with_salt(mut self, salt: impl Into<String>) -> Self {
        self.salt = Some(salt.into());
        self
    }

    pub fn with_case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    /// Trim and collapse runs of whitespace to a single space.
    pub fn normalize(&self, input: &str) -> String {
        let collapsed = WHITESPACE.replace_all(input.trim(), " ");
        if self.case_sensitive {
            collapsed.into_owned()
        } else {
            collapsed.to_lowercase()
        }
    }

    pub fn generate(&self, task_type: TaskType, input: &str) -> CacheKey {
        let mut hasher = Sha256::new();
        hasher.update(task_type.as_str().as_bytes());
        hasher.update([0u8]);
        if let Some(ref s) = self.salt {
            hasher.update(s.as_bytes());
            hasher.update([0u8]);
        }
        hasher.update(self.normalize(input).as_bytes());
        let hash: String = hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect();
        CacheKey::new(task_type, hash)
    }
}

impl Default for CacheKeyGenerator {
    fn default() -> Self {
        Self::new()
    }
}
