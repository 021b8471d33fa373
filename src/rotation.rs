//! Round-robin selection of the categories refreshed each cycle

use serde::Serialize;

/// Rotation pointer over the rotating (non-static) categories.
///
/// Each cycle takes `categories_per_cycle` consecutive categories starting at
/// the pointer, wrapping at the end, then moves the pointer past them. With
/// `n` categories every one is visited within `ceil(n / per_cycle)` cycles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategoryRotation {
    index: usize,
    categories_per_cycle: usize,
}

impl CategoryRotation {
    pub fn new(categories_per_cycle: usize) -> Self {
        Self {
            index: 0,
            categories_per_cycle: categories_per_cycle.max(1),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn categories_per_cycle(&self) -> usize {
        self.categories_per_cycle
    }

    pub fn set_categories_per_cycle(&mut self, per_cycle: usize) {
        self.categories_per_cycle = per_cycle.max(1);
    }

    /// Pick this cycle's categories and advance.
    ///
    /// `per_cycle` is clamped to the number of categories so a cycle never
    /// fetches the same category twice.
    pub fn next_batch(&mut self, categories: &[String]) -> Vec<String> {
        let total = categories.len();
        if total == 0 {
            return Vec::new();
        }
        let take = self.categories_per_cycle.min(total);
        let start = self.index % total;
        let batch = (0..take)
            .map(|i| categories[(start + i) % total].clone())
            .collect();
        self.index = (start + take) % total;
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cats(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_wraps_around() {
        let all = cats(&["a", "b", "c"]);
        let mut rotation = CategoryRotation::new(2);
        assert_eq!(rotation.next_batch(&all), cats(&["a", "b"]));
        assert_eq!(rotation.next_batch(&all), cats(&["c", "a"]));
        assert_eq!(rotation.next_batch(&all), cats(&["b", "c"]));
        assert_eq!(rotation.index(), 0);
    }

    #[test]
    fn test_per_cycle_clamped_to_total() {
        let all = cats(&["a", "b"]);
        let mut rotation = CategoryRotation::new(5);
        assert_eq!(rotation.next_batch(&all), cats(&["a", "b"]));
        assert_eq!(rotation.next_batch(&all), cats(&["a", "b"]));
    }

    #[test]
    fn test_empty_and_shrinking_sets() {
        let mut rotation = CategoryRotation::new(2);
        assert!(rotation.next_batch(&[]).is_empty());
        let all = cats(&["a", "b", "c", "d"]);
        rotation.next_batch(&all);
        rotation.next_batch(&all);
        assert_eq!(rotation.index(), 0);
        rotation.next_batch(&all);
        // Allowlist shrank under the pointer
        assert_eq!(rotation.next_batch(&cats(&["x"])), cats(&["x"]));
    }
}
