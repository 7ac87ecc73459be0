use std::collections::HashMap;

/// Counts keys while remembering the order each key was first seen.
#[derive(Debug, Clone, Default)]
pub struct OrderedCounter {
    index: HashMap<String, usize>,
    entries: Vec<(String, usize)>,
}

impl OrderedCounter {
    pub fn increment(&mut self, key: &str) {
        self.add(key, 1);
    }

    fn add(&mut self, key: &str, n: usize) {
        match self.index.get(key) {
            Some(&i) => self.entries[i].1 += n,
            None => {
                self.index.insert(key.to_string(), self.entries.len());
                self.entries.push((key.to_string(), n));
            }
        }
    }

    pub fn get(&self, key: &str) -> usize {
        self.index.get(key).map_or(0, |&i| self.entries[i].1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys with their counts, in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.entries.iter().map(|(k, n)| (k.as_str(), *n))
    }

    /// The `n` highest counts, descending. Equal counts keep first-seen order.
    pub fn most_common(&self, n: usize) -> Vec<(String, usize)> {
        let mut sorted = self.entries.clone();
        sorted.sort_by(|a, b| b.1.cmp(&a.1));
        sorted.truncate(n);
        sorted
    }

    /// Adds every count of `other`. Keys new to `self` are appended in
    /// `other`'s first-seen order.
    pub fn merge(&mut self, other: &OrderedCounter) {
        for (key, n) in other.iter() {
            self.add(key, n);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_most_common_ties_keep_first_seen_order() {
        let mut counter = OrderedCounter::default();
        for key in ["b", "a", "c", "a", "b", "d"] {
            counter.increment(key);
        }

        let top = counter.most_common(3);
        assert_eq!(
            top,
            vec![("b".to_string(), 2), ("a".to_string(), 2), ("c".to_string(), 1)]
        );
    }

    #[test]
    fn test_merge_sums_and_appends() {
        let mut left = OrderedCounter::default();
        left.increment("x");
        left.increment("y");

        let mut right = OrderedCounter::default();
        right.increment("z");
        right.increment("x");

        left.merge(&right);

        assert_eq!(left.get("x"), 2);
        assert_eq!(left.get("z"), 1);
        let keys: Vec<_> = left.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["x", "y", "z"]);
    }
}
