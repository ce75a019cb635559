//! Content-derived container IDs (spec.md §4.A).
//!
//! The id is the lowercase hex SHA-256 of a canonical textual rendering of
//! the descriptor followed by a newline, matching the original's
//! `utils.HashStr`, which hashes `fmt.Appendln(nil, v)` — the value's
//! `%v`-style `Debug` rendering plus a trailing `\n`.

use sha2::{Digest, Sha256};

/// Anything that can be rendered the way the original's `%v` verb would:
/// implementors provide the exact text that gets hashed.
pub trait HashInput {
    fn canonical_text(&self) -> String;
}

pub fn hash_str(input: &impl HashInput) -> String {
    let mut rendering = input.canonical_text();
    rendering.push('\n');
    let mut hasher = Sha256::new();
    hasher.update(rendering.as_bytes());
    hex::encode(hasher.finalize())
}

/// Convenience for the reference test vector: hashes a plain string as
/// Go's `%v` would render it (a bare string renders as itself).
pub fn hash_plain_str(s: &str) -> String {
    let mut rendering = s.to_string();
    rendering.push('\n');
    let mut hasher = Sha256::new();
    hasher.update(rendering.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_plain_str_matches_reference_vector() {
        // spec.md §8: HashStr("test") = "f2ca1bb6c7e907d06dafe4687e579fce76b37e4e93b7605022da52e6ccc26fd2"
        let got = hash_plain_str("test");
        assert_eq!(got, "f2ca1bb6c7e907d06dafe4687e579fce76b37e4e93b7605022da52e6ccc26fd2");
    }
}
