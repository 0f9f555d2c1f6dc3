//! Physical tree names
//!
//! Every group, sequence, and index is backed by a named tree in the key
//! space. Names are looked up by identity after restarts, so generation
//! must be stable, and distinct objects must never collide even after
//! truncation. Components are escaped before joining so that
//! `("foo.bar", "baz")` and `("foo", "bar.baz")` stay distinct, and
//! over-long names are shortened to a prefix plus a stable hash of the
//! full unambiguous form.

/// Upper bound on generated tree name length, in bytes.
pub const MAX_TREE_NAME_LENGTH: usize = 64;

/// Bytes reserved for the `$` separator plus the 16 hex digest characters.
const DIGEST_SUFFIX_LEN: usize = 17;

/// Tree name for a group's primary key region.
pub fn generate_group_tree_name(schema: &str, group: &str) -> String {
    bounded_join(&["g", schema, group])
}

/// Tree name for a sequence.
pub fn generate_sequence_tree_name(schema: &str, sequence: &str) -> String {
    bounded_join(&["s", schema, sequence])
}

/// Tree name for a table or group index.
pub fn generate_index_tree_name(schema: &str, table: &str, index: &str) -> String {
    bounded_join(&["i", schema, table, index])
}

/// Escape `.` (the joiner), `\` (the escape), and `$` (the digest
/// separator) so that component boundaries are unambiguous and short names
/// can never look like truncated ones.
fn escape_into(component: &str, out: &mut String) {
    for ch in component.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '.' => out.push_str("\\."),
            '$' => out.push_str("\\$"),
            _ => out.push(ch),
        }
    }
}

fn bounded_join(components: &[&str]) -> String {
    let mut raw = String::new();
    for (i, component) in components.iter().enumerate() {
        if i > 0 {
            raw.push('.');
        }
        escape_into(component, &mut raw);
    }

    if raw.len() <= MAX_TREE_NAME_LENGTH {
        return raw;
    }

    let digest = fnv1a64(raw.as_bytes());
    let mut cut = MAX_TREE_NAME_LENGTH - DIGEST_SUFFIX_LEN;
    while !raw.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}${digest:016x}", &raw[..cut])
}

fn fnv1a64(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colliding_concatenations_stay_distinct() {
        let a = generate_group_tree_name("foo.bar", "baz");
        let b = generate_group_tree_name("foo", "bar.baz");
        assert_ne!(a, b);

        let c = generate_index_tree_name("foo", "bar.baz", "qux");
        let d = generate_index_tree_name("foo.bar", "baz", "qux");
        assert_ne!(c, d);

        let e = generate_index_tree_name("a.", "b", "c");
        let f = generate_index_tree_name("a", ".b", "c");
        assert_ne!(e, f);
    }

    #[test]
    fn kinds_never_collide() {
        assert_ne!(
            generate_group_tree_name("s", "x"),
            generate_sequence_tree_name("s", "x")
        );
    }

    #[test]
    fn long_names_are_bounded_and_distinct() {
        let long_a = "a".repeat(MAX_TREE_NAME_LENGTH * 2);
        let long_b = format!("{}b", &long_a[..long_a.len() - 1]);

        let a = generate_group_tree_name("schema", &long_a);
        let b = generate_group_tree_name("schema", &long_b);

        assert!(a.len() <= MAX_TREE_NAME_LENGTH);
        assert!(b.len() <= MAX_TREE_NAME_LENGTH);
        assert_ne!(a, b);
    }

    #[test]
    fn generation_is_stable() {
        let long = "customers".repeat(20);
        assert_eq!(
            generate_index_tree_name("test", &long, "by_name"),
            generate_index_tree_name("test", &long, "by_name")
        );
    }
}
