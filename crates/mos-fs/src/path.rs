//! Path validation and splitting
//!
//! Component names start with a letter and continue with letters, digits,
//! underscore, or period, up to [`MAX_FILE_NAME`](crate::MAX_FILE_NAME)
//! characters. Paths are `/`-separated, at most
//! [`MAX_PATH_NAME`](crate::MAX_PATH_NAME) characters; a leading `/` anchors
//! resolution at the root and a trailing `/` marks a directory.

use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::error::FsError;
use crate::{MAX_FILE_NAME, MAX_PATH_NAME};

/// A validated, split path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSpec {
    /// Resolution starts at the root rather than the current directory
    pub absolute: bool,
    /// The component names, in order
    pub components: Vec<String>,
    /// Path ended in `/`: the final component names a directory
    pub trailing_slash: bool,
}

/// Whether `name` is a legal path component.
pub fn valid_node_name(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_FILE_NAME {
        return false;
    }
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

/// Validate and split a path into its components.
pub fn parse_path(path: &str) -> Result<PathSpec, FsError> {
    if path.is_empty() {
        return Err(FsError::invalid_path("empty path"));
    }
    if path.len() > MAX_PATH_NAME {
        return Err(FsError::invalid_path("path too long"));
    }

    let absolute = path.starts_with('/');
    let trailing_slash = path.ends_with('/');
    let trimmed = path.trim_matches('/');

    let mut components = Vec::new();
    if !trimmed.is_empty() {
        for part in trimmed.split('/') {
            if !valid_node_name(part) && part != "." && part != ".." {
                return Err(FsError::invalid_path(part.to_string()));
            }
            components.push(part.to_string());
        }
    }

    Ok(PathSpec {
        absolute,
        components,
        trailing_slash,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn names_must_start_with_a_letter() {
        assert!(valid_node_name("notes"));
        assert!(valid_node_name("a1_b.txt"));
        assert!(!valid_node_name("1abc"));
        assert!(!valid_node_name("_abc"));
        assert!(!valid_node_name(".hidden"));
        assert!(!valid_node_name(""));
    }

    #[test]
    fn names_respect_the_length_limit() {
        assert!(valid_node_name("abcdefghijklmn")); // 14 chars
        assert!(!valid_node_name("abcdefghijklmno")); // 15 chars
    }

    #[test]
    fn names_reject_bad_characters() {
        assert!(!valid_node_name("a b"));
        assert!(!valid_node_name("a-b"));
        assert!(!valid_node_name("a/b"));
    }

    #[test]
    fn absolute_and_relative_split() {
        let p = parse_path("/a/b/c").unwrap();
        assert!(p.absolute);
        assert!(!p.trailing_slash);
        assert_eq!(p.components, vec!["a", "b", "c"]);

        let p = parse_path("a/b").unwrap();
        assert!(!p.absolute);
        assert_eq!(p.components, vec!["a", "b"]);
    }

    #[test]
    fn trailing_slash_marks_directory() {
        let p = parse_path("/a/b/").unwrap();
        assert!(p.trailing_slash);
        assert_eq!(p.components, vec!["a", "b"]);
    }

    #[test]
    fn root_alone_is_valid() {
        let p = parse_path("/").unwrap();
        assert!(p.absolute);
        assert!(p.components.is_empty());
    }

    #[test]
    fn dot_components_pass_through() {
        let p = parse_path("../x").unwrap();
        assert_eq!(p.components, vec!["..", "x"]);
    }

    #[test]
    fn malformed_paths_are_rejected() {
        assert!(parse_path("").is_err());
        assert!(parse_path("/a/1bad").is_err());
        let long = alloc::format!("/{}", "a".repeat(300));
        assert!(parse_path(&long).is_err());
    }
}
