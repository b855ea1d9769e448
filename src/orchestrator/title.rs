//! Weighted random selection of the game surface title.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// A candidate title and its relative weight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightedTitle {
    pub text: String,
    pub weight: u32,
}

impl WeightedTitle {
    pub fn new(text: impl Into<String>, weight: u32) -> Self {
        Self {
            text: text.into(),
            weight,
        }
    }
}

/// Titles used when none are configured: four common ones and a rare one.
pub fn default_titles() -> Vec<WeightedTitle> {
    vec![
        WeightedTitle::new("Mirror Launcher - Support the developers by playing on the official client", 50),
        WeightedTitle::new("Mirror Launcher - Extensions may hurt the game's developers, pay when you can", 50),
        WeightedTitle::new("Mirror Launcher - Recommend the game to a friend", 50),
        WeightedTitle::new("Mirror Launcher - Only purchased cosmetics are visible to other players", 50),
        WeightedTitle::new("Meow! - Meow meow? Meow! Meow~~", 1),
    ]
}

/// Picks titles with probability proportional to their weight.
#[derive(Debug, Clone)]
pub struct TitlePicker {
    titles: Vec<WeightedTitle>,
    total: u64,
}

impl TitlePicker {
    /// Creates a picker. Returns `None` if the total weight is zero.
    pub fn new(titles: Vec<WeightedTitle>) -> Option<Self> {
        let total = titles.iter().map(|t| u64::from(t.weight)).sum();
        if total == 0 {
            return None;
        }
        Some(Self { titles, total })
    }

    pub fn titles(&self) -> &[WeightedTitle] {
        &self.titles
    }

    pub fn total_weight(&self) -> u64 {
        self.total
    }

    /// Draws one title.
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> &str {
        self.select(rng.gen_range(0..self.total))
    }

    /// Maps a draw in `[0, total)` to its title by walking the cumulative weights.
    fn select(&self, mut draw: u64) -> &str {
        for title in &self.titles {
            let weight = u64::from(title.weight);
            if draw < weight {
                return &title.text;
            }
            draw -= weight;
        }
        // draw < total, so the loop always returns; keep the last as a floor.
        self.titles
            .last()
            .map(|t| t.text.as_str())
            .unwrap_or_default()
    }
}

impl Default for TitlePicker {
    fn default() -> Self {
        let titles = default_titles();
        let total = titles.iter().map(|t| u64::from(t.weight)).sum();
        Self { titles, total }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    #[test]
    fn test_zero_weight_is_rejected() {
        assert!(TitlePicker::new(vec![]).is_none());
        assert!(TitlePicker::new(vec![WeightedTitle::new("a", 0)]).is_none());
    }

    #[test]
    fn test_select_walks_cumulative_weights() {
        let picker = TitlePicker::new(vec![
            WeightedTitle::new("a", 2),
            WeightedTitle::new("zero", 0),
            WeightedTitle::new("b", 1),
        ])
        .unwrap();

        assert_eq!(picker.select(0), "a");
        assert_eq!(picker.select(1), "a");
        assert_eq!(picker.select(2), "b");
    }

    #[test]
    fn test_default_distribution() {
        let picker = TitlePicker::default();
        assert_eq!(picker.total_weight(), 201);

        let mut rng = StdRng::seed_from_u64(7);
        let samples = 201_000;
        let mut counts: HashMap<String, u32> = HashMap::new();
        for _ in 0..samples {
            *counts.entry(picker.pick(&mut rng).to_string()).or_default() += 1;
        }

        for title in picker.titles() {
            let observed = f64::from(counts.get(&title.text).copied().unwrap_or(0)) / samples as f64;
            let expected = f64::from(title.weight) / 201.0;
            assert!(
                (observed - expected).abs() < 0.01,
                "{}: observed {} expected {}",
                title.text,
                observed,
                expected
            );
        }
    }

    #[test]
    fn test_single_title_always_chosen() {
        let picker = TitlePicker::new(vec![WeightedTitle::new("only", 3)]).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..100 {
            assert_eq!(picker.pick(&mut rng), "only");
        }
    }
}
