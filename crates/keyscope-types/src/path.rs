//! Separator-aware helpers for decomposing flat keys into tree paths.
//!
//! Keys are absolute when they begin with the separator. The namespace root
//! is the separator itself and sits at level 1; `/foo` is level 2,
//! `/foo/bar` level 3, and so on.

/// Depth of `key` in the projected tree.
///
/// This is the number of segments produced by splitting `key` on
/// `separator`, except that the root key (equal to `separator`) is level 1.
///
/// # Examples
///
/// ```
/// use keyscope_types::path::level;
///
/// assert_eq!(level("/", "/"), 1);
/// assert_eq!(level("/foo", "/"), 2);
/// assert_eq!(level("/foo/bar", "/"), 3);
/// ```
pub fn level(key: &str, separator: &str) -> usize {
    if key == separator {
        1
    } else {
        key.split(separator).count()
    }
}

/// Every non-empty path prefix of `key`, shortest first, ending with `key`.
///
/// `/foo/bar/baz` yields `/foo`, `/foo/bar`, `/foo/bar/baz`.
pub fn ancestors(key: &str, separator: &str) -> Vec<String> {
    let segments: Vec<&str> = key.split(separator).collect();
    (1..=segments.len())
        .map(|n| segments[..n].join(separator))
        .filter(|path| !path.is_empty())
        .collect()
}

pub fn is_absolute(key: &str, separator: &str) -> bool {
    key.starts_with(separator)
}

/// Make `key` absolute.
///
/// A key that does not start with the separator is treated as a top-level
/// path: `foo` becomes `/foo`.
pub fn normalize_key(key: &str, separator: &str) -> String {
    if is_absolute(key, separator) {
        key.to_string()
    } else {
        format!("{separator}{key}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels() {
        assert_eq!(level("/", "/"), 1);
        assert_eq!(level("/a", "/"), 2);
        assert_eq!(level("/a/b/c", "/"), 4);
        assert_eq!(level("/a/", "/"), 3);
    }

    #[test]
    fn levels_with_multichar_separator() {
        assert_eq!(level("::", "::"), 1);
        assert_eq!(level("::a::b", "::"), 3);
    }

    #[test]
    fn ancestor_chain() {
        assert_eq!(ancestors("/foo/bar/baz", "/"), vec!["/foo", "/foo/bar", "/foo/bar/baz"]);
        assert_eq!(ancestors("/foo", "/"), vec!["/foo"]);
    }

    #[test]
    fn ancestor_levels_increase_by_one() {
        let chain = ancestors("/a/b/c/d", "/");
        for (i, a) in chain.iter().enumerate() {
            assert_eq!(level(a, "/"), i + 2);
        }
    }

    #[test]
    fn normalization() {
        assert_eq!(normalize_key("/foo", "/"), "/foo");
        assert_eq!(normalize_key("foo", "/"), "/foo");
        assert_eq!(normalize_key("foo/bar", "/"), "/foo/bar");
        assert!(is_absolute("/", "/"));
        assert!(!is_absolute("foo", "/"));
    }
}
