//! Order-independent fingerprint of registry contents.
//!
//! Used only as a cheap "possibly unchanged" gate between the live registry
//! and the persisted snapshot. Entries are sorted by identifier and every
//! field is length-prefixed before hashing, so the result depends only on the
//! set of `(id, binding)` pairs and is stable across runs.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::shortcuts::ShortcutBinding;

/// Hex-encoded SHA-256 over the sorted entries.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fingerprint a set of registry entries, in any iteration order.
pub fn fingerprint<'a, I>(entries: I) -> Fingerprint
where
    I: IntoIterator<Item = (&'a String, &'a ShortcutBinding)>,
{
    let mut sorted: Vec<(&String, &ShortcutBinding)> = entries.into_iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let mut hasher = Sha256::new();
    for (id, shortcut) in sorted {
        for field in [
            id.as_str(),
            shortcut.name.as_str(),
            shortcut.binding.as_str(),
            shortcut.command.as_str(),
        ] {
            hasher.update((field.len() as u64).to_le_bytes());
            hasher.update(field.as_bytes());
        }
    }

    Fingerprint(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, HashMap};

    fn sample() -> BTreeMap<String, ShortcutBinding> {
        let mut entries = BTreeMap::new();
        entries.insert(
            "/custom0/".to_string(),
            ShortcutBinding::new("Terminal", "<Super>t", "gnome-terminal"),
        );
        entries.insert(
            "/custom1/".to_string(),
            ShortcutBinding::new("Files", "<Super>e", "nautilus"),
        );
        entries
    }

    /// xorshift64*, enough to perturb snapshots reproducibly
    struct Rng(u64);

    impl Rng {
        fn next(&mut self) -> u64 {
            self.0 ^= self.0 >> 12;
            self.0 ^= self.0 << 25;
            self.0 ^= self.0 >> 27;
            self.0.wrapping_mul(0x2545_F491_4F6C_DD1D)
        }

        fn below(&mut self, n: u64) -> u64 {
            self.next() % n
        }

        fn word(&mut self) -> String {
            let len = 1 + self.below(8) as usize;
            (0..len)
                .map(|_| (b'a' + self.below(26) as u8) as char)
                .collect()
        }
    }

    fn random_snapshot(rng: &mut Rng) -> BTreeMap<String, ShortcutBinding> {
        let count = 1 + rng.below(20);
        (0..count)
            .map(|i| {
                (
                    format!("/custom{}/", i),
                    ShortcutBinding::new(rng.word(), format!("<Super>{}", rng.word()), rng.word()),
                )
            })
            .collect()
    }

    fn perturb(rng: &mut Rng, entries: &mut BTreeMap<String, ShortcutBinding>) {
        let ids: Vec<String> = entries.keys().cloned().collect();
        let victim = ids[rng.below(ids.len() as u64) as usize].clone();
        match rng.below(5) {
            0 => {
                entries.remove(&victim);
            }
            1 => {
                entries.insert(
                    format!("/extra-{}/", rng.word()),
                    ShortcutBinding::new("x", "<Super>x", "x"),
                );
            }
            2 => entries.get_mut(&victim).unwrap().name.push('!'),
            3 => entries.get_mut(&victim).unwrap().binding.push('!'),
            _ => entries.get_mut(&victim).unwrap().command.push('!'),
        }
    }

    #[test]
    fn stable_for_same_input() {
        assert_eq!(fingerprint(&sample()), fingerprint(&sample()));
    }

    #[test]
    fn independent_of_iteration_order() {
        let ordered = sample();
        let shuffled: HashMap<String, ShortcutBinding> = ordered.clone().into_iter().rev().collect();
        assert_eq!(fingerprint(&ordered), fingerprint(&shuffled));
    }

    #[test]
    fn empty_snapshot_has_fingerprint() {
        let empty: BTreeMap<String, ShortcutBinding> = BTreeMap::new();
        assert_eq!(fingerprint(&empty).as_str().len(), 64);
    }

    #[test]
    fn field_boundaries_matter() {
        let mut a = BTreeMap::new();
        a.insert("id".to_string(), ShortcutBinding::new("ab", "c", "d"));
        let mut b = BTreeMap::new();
        b.insert("id".to_string(), ShortcutBinding::new("a", "bc", "d"));
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn perturbed_snapshots_differ() {
        let mut rng = Rng(0x9E37_79B9_7F4A_7C15);
        for _ in 0..500 {
            let original = random_snapshot(&mut rng);
            let mut changed = original.clone();
            perturb(&mut rng, &mut changed);
            if changed == original {
                continue;
            }
            assert_ne!(fingerprint(&original), fingerprint(&changed));
        }
    }

    #[test]
    fn serializes_as_plain_string() {
        let fp = fingerprint(&sample());
        let json = serde_json::to_string(&fp).unwrap();
        assert_eq!(json, format!("\"{}\"", fp));
    }
}
