//! TTL cache capability shared by the consent gate, geo enrichment,
//! staging record lookups and account-id resolution.

mod moka;
mod null;
mod traits;

pub use self::moka::MokaTtlCache;
pub use null::NullTtlCache;
pub use traits::TtlCache;

use xxhash_rust::xxh64::xxh64;

/// Builds a fixed-width cache key from `namespace` and the hashed `parts`.
///
/// Parts are joined with a unit separator so `("ab", "c")` and `("a", "bc")`
/// never collide.
pub fn cache_key(namespace: &str, parts: &[&str]) -> String {
    let joined = parts.join("\u{1f}");
    format!("{}:{:016x}", namespace, xxh64(joined.as_bytes(), 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_is_stable_and_separated() {
        assert_eq!(
            cache_key("consent", &["example.com"]),
            cache_key("consent", &["example.com"])
        );
        assert_ne!(cache_key("acct", &["ab", "c"]), cache_key("acct", &["a", "bc"]));
        assert!(cache_key("geo", &["1.1.1.1"]).starts_with("geo:"));
    }
}
