use std::cmp::Reverse;
use std::collections::BTreeMap;

/// A multi-value map ordered by level, highest level first. Items sharing a
/// level keep their insertion order.
#[derive(Debug, Clone)]
pub struct LevelDictionary<T> {
    levels: BTreeMap<Reverse<i32>, Vec<T>>,
}

impl<T> Default for LevelDictionary<T> {
    fn default() -> Self {
        Self {
            levels: BTreeMap::new(),
        }
    }
}

impl<T> LevelDictionary<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, level: i32, item: T) {
        self.levels.entry(Reverse(level)).or_default().push(item);
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.levels.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.levels.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::LevelDictionary;

    #[test]
    fn orders_by_level_then_insertion() {
        let mut dictionary = LevelDictionary::new();
        dictionary.insert(1, "low");
        dictionary.insert(10, "high");
        dictionary.insert(1, "low again");
        dictionary.insert(5, "middle");
        let order: Vec<&str> = dictionary.iter().copied().collect();
        assert_eq!(order, vec!["high", "middle", "low", "low again"]);
        assert_eq!(dictionary.len(), 4);
    }
}
