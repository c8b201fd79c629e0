//! Topic selector (§4.10): weighted sampling across topic sources with
//! a FIFO cooldown that suppresses recently emitted keywords.

use std::collections::VecDeque;

use rand::Rng;

const COOLDOWN_CAPACITY: usize = 6;

#[derive(Debug, Clone)]
pub struct TopicWeights {
    pub core: f32,
    pub time: f32,
    pub curiosity: f32,
    pub inspiration: f32,
    pub trends: f32,
}

impl Default for TopicWeights {
    fn default() -> Self {
        Self {
            core: 1.0,
            time: 1.2,
            curiosity: 1.8,
            inspiration: 1.0,
            trends: 1.5,
        }
    }
}

/// Candidate keywords gathered from each source for this selection round.
#[derive(Debug, Clone, Default)]
pub struct SourceCandidates {
    pub core: Vec<String>,
    pub time: Vec<String>,
    pub curiosity: Vec<String>,
    pub inspiration: Vec<String>,
    pub trends: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct TopicQuery {
    pub keyword: String,
    pub source: &'static str,
    pub query_string: String,
}

pub struct TopicSelector {
    weights: TopicWeights,
    negative_keywords: Vec<String>,
    fallback: Vec<String>,
    cooldown: VecDeque<String>,
}

impl TopicSelector {
    pub fn new(weights: TopicWeights, negative_keywords: Vec<String>, fallback: Vec<String>) -> Self {
        Self {
            weights,
            negative_keywords,
            fallback,
            cooldown: VecDeque::with_capacity(COOLDOWN_CAPACITY),
        }
    }

    fn is_cooling_down(&self, keyword: &str) -> bool {
        self.cooldown.iter().any(|k| k.eq_ignore_ascii_case(keyword))
    }

    fn build_query_string(&self, keyword: &str) -> String {
        let mut query = keyword.to_string();
        for neg in &self.negative_keywords {
            query.push_str(" -");
            query.push_str(neg);
        }
        query.push_str(" -filter:links -filter:replies");
        query
    }

    fn record(&mut self, keyword: &str) {
        self.cooldown.push_back(keyword.to_string());
        while self.cooldown.len() > COOLDOWN_CAPACITY {
            self.cooldown.pop_front();
        }
    }

    /// Filters every source by the cooldown set, weighted-samples across
    /// all remaining candidates, and falls back to the designated
    /// fallback source if everything else was suppressed.
    pub fn select(&mut self, sources: &SourceCandidates, rng: &mut impl Rng) -> Option<TopicQuery> {
        let mut pool: Vec<(&str, f32, &str)> = Vec::new();
        for kw in &sources.core {
            if !self.is_cooling_down(kw) {
                pool.push((kw, self.weights.core, "core"));
            }
        }
        for kw in &sources.time {
            if !self.is_cooling_down(kw) {
                pool.push((kw, self.weights.time, "time"));
            }
        }
        for kw in &sources.curiosity {
            if !self.is_cooling_down(kw) {
                pool.push((kw, self.weights.curiosity, "curiosity"));
            }
        }
        for kw in &sources.inspiration {
            if !self.is_cooling_down(kw) {
                pool.push((kw, self.weights.inspiration, "inspiration"));
            }
        }
        for kw in &sources.trends {
            if !self.is_cooling_down(kw) {
                pool.push((kw, self.weights.trends, "trends"));
            }
        }

        let (keyword, source) = if pool.is_empty() {
            let fallback_pool: Vec<&str> = self
                .fallback
                .iter()
                .map(|s| s.as_str())
                .filter(|kw| !self.is_cooling_down(kw))
                .collect();
            let chosen = fallback_pool.get(rng.random_range(0..fallback_pool.len().max(1)).min(fallback_pool.len().saturating_sub(1)))?;
            (chosen.to_string(), "fallback")
        } else {
            let total: f32 = pool.iter().map(|(_, w, _)| w).sum();
            let mut roll = rng.random_range(0.0..total);
            let mut chosen = pool[0];
            for entry in &pool {
                if roll < entry.1 {
                    chosen = *entry;
                    break;
                }
                roll -= entry.1;
            }
            (chosen.0.to_string(), chosen.2)
        };

        self.record(&keyword);
        let query_string = self.build_query_string(&keyword);
        Some(TopicQuery {
            keyword,
            source,
            query_string,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn never_reselects_a_cooling_down_keyword() {
        let mut selector = TopicSelector::new(TopicWeights::default(), vec![], vec!["fallback_topic".into()]);
        let sources = SourceCandidates {
            core: vec!["kimchi".into(), "gochujang".into()],
            ..Default::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..2 {
            let q = selector.select(&sources, &mut rng).unwrap();
            assert!(seen.insert(q.keyword.clone()), "reselected {}", q.keyword);
        }
        // third call: both candidates are now cooling down, falls back
        let q = selector.select(&sources, &mut rng).unwrap();
        assert_eq!(q.source, "fallback");
        assert_eq!(q.keyword, "fallback_topic");
    }

    #[test]
    fn query_string_includes_negative_keywords_and_filters() {
        let mut selector = TopicSelector::new(TopicWeights::default(), vec!["ad".into(), "sponsored".into()], vec![]);
        let sources = SourceCandidates {
            core: vec!["kimchi".into()],
            ..Default::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let q = selector.select(&sources, &mut rng).unwrap();
        assert!(q.query_string.contains("-ad"));
        assert!(q.query_string.contains("-sponsored"));
        assert!(q.query_string.contains("-filter:replies"));
    }
}
