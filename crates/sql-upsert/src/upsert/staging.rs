//! Staging table naming.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Utc;
use sha2::{Digest, Sha224};
use uuid::Uuid;

use crate::core::identifier::{split_qualified, validate_identifier, MAX_IDENTIFIER_LENGTH};
use crate::error::Result;

/// Hex characters of the digest kept in generated names.
const HASH_LEN: usize = 16;

static NONCE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Produces staging table names for a target table.
///
/// With an explicit postfix the name is `{table}_{postfix}` and uniqueness is
/// the caller's problem. Otherwise it is
/// `{table}_{yyyymmddHHMMSSffffff}_{digest}`, where the digest is a SHA-224
/// of a nonce mixing the clock, a random UUID and a process-wide counter.
///
/// Names never exceed [`MAX_IDENTIFIER_LENGTH`] characters. When too long,
/// the table part is shortened so the distinguishing suffix survives. A
/// `db.` qualifier on the target is carried over to the staging name.
#[derive(Debug, Default, Clone, Copy)]
pub struct StagingNameAllocator;

impl StagingNameAllocator {
    pub fn new() -> Self {
        Self
    }

    /// Allocate a staging name for `table`.
    pub fn allocate(&self, table: &str, postfix: Option<&str>) -> Result<String> {
        let (qualifier, bare) = split_qualified(table);
        validate_identifier(bare)?;

        let suffix = match normalize_postfix(postfix) {
            Some(p) => format!("_{}", p),
            None => format!("_{}_{}", Utc::now().format("%Y%m%d%H%M%S%6f"), nonce_digest()),
        };

        let name = fit_name(bare, &suffix);
        validate_identifier(&name)?;

        Ok(match qualifier {
            Some(q) => format!("{}.{}", q, name),
            None => name,
        })
    }
}

/// Strip all whitespace from a postfix; empty means "not supplied".
pub fn normalize_postfix(postfix: Option<&str>) -> Option<String> {
    postfix
        .map(|p| p.chars().filter(|c| !c.is_whitespace()).collect::<String>())
        .filter(|p| !p.is_empty())
}

fn nonce_digest() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let counter = NONCE_COUNTER.fetch_add(1, Ordering::Relaxed);
    let nonce = format!("{}:{}:{}", nanos, Uuid::new_v4(), counter);

    let digest = Sha224::digest(nonce.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    hex[..HASH_LEN].to_string()
}

/// Join `prefix` and `suffix`, shortening the prefix to fit the limit.
fn fit_name(prefix: &str, suffix: &str) -> String {
    let suffix_len = suffix.chars().count();
    if suffix_len >= MAX_IDENTIFIER_LENGTH {
        return format!("{}{}", prefix, suffix)
            .chars()
            .take(MAX_IDENTIFIER_LENGTH)
            .collect();
    }

    let room = MAX_IDENTIFIER_LENGTH - suffix_len;
    let head: String = prefix.chars().take(room).collect();
    format!("{}{}", head, suffix)
}
