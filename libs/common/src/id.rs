use ulid::Ulid;

/// Generates a new ULID-based ID with the given prefix.
///
/// # Examples
/// ```
/// let id = roster_common::id::prefixed_ulid("flt");
/// assert!(id.starts_with("flt_"));
/// ```
pub fn prefixed_ulid(prefix: &str) -> String {
    format!("{}_{}", prefix, Ulid::new().to_string())
}

/// Well-known ID prefixes.
pub mod prefix {
    pub const FILTER: &str = "flt";
    pub const ROLE: &str = "role";
    pub const PERMISSION: &str = "perm";
}

/// Returns true if `id` was produced by [`prefixed_ulid`] with `prefix`.
pub fn has_prefix(id: &str, prefix: &str) -> bool {
    id.strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('_'))
        .is_some_and(|ulid| Ulid::from_string(ulid).is_ok())
}
