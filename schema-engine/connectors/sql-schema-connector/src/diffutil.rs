//! Set/map difference primitives shared by every diff step.

use indexmap::{IndexMap, IndexSet};
use sha2::{Digest, Sha256};
use std::hash::Hash;

/// `{x in A | x not in B}`.
pub fn set_difference<'a, T: Eq + Hash>(a: &'a IndexSet<T>, b: &IndexSet<T>) -> Vec<&'a T> {
    a.iter().filter(|x| !b.contains(*x)).collect()
}

/// `{k | k in dom A ∩ dom B, !eq(A[k], B[k])}`.
pub fn map_difference<K, V, F>(a: &IndexMap<K, V>, b: &IndexMap<K, V>, eq: F) -> Vec<K>
where
    K: Eq + Hash + Clone,
    F: Fn(&V, &V) -> bool,
{
    a.keys()
        .filter(|k| match b.get(*k) {
            Some(bv) => !eq(&a[*k], bv),
            None => false,
        })
        .cloned()
        .collect()
}

/// Greedy first-match partial bijection between `keysA` and `keysB`: for
/// each key in `keysA`, in insertion order, scan `keysB` for the first
/// value `eq` accepts. The result is keyed by the *new* (`B`) name so that
/// a later `A` key matching the same `B` key naturally overwrites the
/// earlier one on insert: when several old objects could match the same
/// new one, the last one encountered in definition order wins.
pub fn mapped_difference<K, V, F>(
    a: &IndexMap<K, V>,
    keys_a: &[K],
    b: &IndexMap<K, V>,
    keys_b: &[K],
    eq: F,
) -> IndexMap<K, K>
where
    K: Eq + Hash + Clone,
    F: Fn(&V, &V) -> bool,
{
    let mut result = IndexMap::new();
    for k in keys_a {
        let Some(av) = a.get(k) else { continue };
        if let Some(matched_b) = keys_b.iter().find(|k2| b.get(*k2).is_some_and(|bv| eq(av, bv))) {
            result.insert(matched_b.clone(), k.clone());
        }
    }
    result
}

/// SHA-256 over the file content after normalizing line endings to LF.
pub fn file_hash(content: &[u8]) -> String {
    let normalized: Vec<u8> = {
        let mut out = Vec::with_capacity(content.len());
        let mut i = 0;
        while i < content.len() {
            if content[i] == b'\r' && content.get(i + 1) == Some(&b'\n') {
                i += 1;
                continue;
            }
            out.push(content[i]);
            i += 1;
        }
        out
    };
    let mut hasher = Sha256::new();
    hasher.update(&normalized);
    hex::encode(hasher.finalize())
}
