//! Glob-style matching of test case names.
//!
//! Only two meta-characters exist: `*` matches any run of characters,
//! including none, and `?` matches exactly one character.  There are no
//! character classes and no escaping.

use std::collections::BTreeSet;

/// True if `pattern` contains a meta-character.
pub fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?'])
}

/// True if `name` matches `pattern` in its entirety.
pub fn matches_glob(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();

    let (mut p, mut n) = (0, 0);
    // Position of the last `*` seen and the name position it was tried at.
    let mut backtrack: Option<(usize, usize)> = None;

    while n < name.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, n));
                p += 1;
            }
            Some(&c) if c == '?' || c == name[n] => {
                p += 1;
                n += 1;
            }
            _ => match backtrack {
                // Let the last star swallow one more character.
                Some((star, tried)) => {
                    p = star + 1;
                    n = tried + 1;
                    backtrack = Some((star, tried + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|&c| c == '*')
}

/// The subset of `candidates` that `pattern` matches.
pub fn expand_glob(pattern: &str, candidates: &BTreeSet<String>) -> BTreeSet<String> {
    candidates
        .iter()
        .filter(|name| matches_glob(pattern, name))
        .cloned()
        .collect()
}
