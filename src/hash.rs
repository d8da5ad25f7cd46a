use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

pub fn stable_hash_with(f: impl FnOnce(&mut DefaultHasher)) -> u64 {
    let mut hasher = DefaultHasher::new();
    f(&mut hasher);
    hasher.finish()
}

pub fn stable_hash_str(seed: u64, value: &str) -> u64 {
    stable_hash_with(|hasher| {
        seed.hash(hasher);
        value.hash(hasher);
    })
}

/// Order-sensitive checksum over a sequence of record ids.
pub fn checksum_ids<'a>(ids: impl IntoIterator<Item = &'a str>) -> u64 {
    stable_hash_with(|hasher| {
        let mut count = 0usize;
        for id in ids {
            id.hash(hasher);
            count += 1;
        }
        count.hash(hasher);
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_is_order_sensitive() {
        let a = checksum_ids(["a", "b", "c"]);
        let b = checksum_ids(["c", "b", "a"]);
        assert_ne!(a, b);
        assert_eq!(a, checksum_ids(["a", "b", "c"]));
    }

    #[test]
    fn seeded_hash_depends_on_seed() {
        assert_ne!(stable_hash_str(1, "img"), stable_hash_str(2, "img"));
    }
}
