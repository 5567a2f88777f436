use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};

use crate::{Key, KeyValue};

/// A unique set of attributes that can be used as instrument identifiers.
///
/// Attributes are sorted by key and de-duplicated, keeping the last value
/// given for a key. The hash is computed once on construction.
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub(crate) struct AttributeSet(Vec<KeyValue>, u64);

impl From<&[KeyValue]> for AttributeSet {
    fn from(values: &[KeyValue]) -> Self {
        let mut sorted = values.to_vec();
        // stable, so among equal keys the input order is kept
        sorted.sort_by(|a, b| a.key.cmp(&b.key));

        let mut deduped: Vec<KeyValue> = Vec::with_capacity(sorted.len());
        for kv in sorted {
            if deduped.last().is_some_and(|last| last.key == kv.key) {
                deduped.pop();
            }
            deduped.push(kv);
        }

        AttributeSet::from_sorted(deduped)
    }
}

fn calculate_hash(values: &[KeyValue]) -> u64 {
    let mut hasher = DefaultHasher::new();
    values.hash(&mut hasher);
    hasher.finish()
}

impl AttributeSet {
    fn from_sorted(values: Vec<KeyValue>) -> Self {
        let hash = calculate_hash(&values);
        AttributeSet(values, hash)
    }

    /// Returns a new set holding only the attributes whose key is in `keys`.
    pub(crate) fn filtered(&self, keys: &HashSet<Key>) -> AttributeSet {
        AttributeSet::from_sorted(
            self.0
                .iter()
                .filter(|kv| keys.contains(&kv.key))
                .cloned()
                .collect(),
        )
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn to_vec(&self) -> Vec<KeyValue> {
        self.0.clone()
    }
}

impl Hash for AttributeSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_does_not_matter() {
        let a = AttributeSet::from(&[KeyValue::new("a", 1_i64), KeyValue::new("b", 2_i64)][..]);
        let b = AttributeSet::from(&[KeyValue::new("b", 2_i64), KeyValue::new("a", 1_i64)][..]);
        assert_eq!(a, b);
    }

    #[test]
    fn last_duplicate_wins() {
        let set = AttributeSet::from(
            &[
                KeyValue::new("k", "first"),
                KeyValue::new("other", true),
                KeyValue::new("k", "last"),
            ][..],
        );
        assert_eq!(
            set.to_vec(),
            vec![KeyValue::new("k", "last"), KeyValue::new("other", true)]
        );
    }

    #[test]
    fn filtering_keeps_allowed_keys() {
        let set = AttributeSet::from(&[KeyValue::new("a", 1_i64), KeyValue::new("b", 2_i64)][..]);
        let allowed: HashSet<Key> = [Key::new("b")].into_iter().collect();
        assert_eq!(set.filtered(&allowed).to_vec(), vec![KeyValue::new("b", 2_i64)]);
    }
}
