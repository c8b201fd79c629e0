//! Pattern tracker (§4.11): per-persona pattern registry, violation
//! checking, and forbidden-character policy enforcement.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use pf_core::text::contains_forbidden_characters;
use pf_core::{PatternType, PatternUsage};

#[derive(Debug, Clone)]
pub struct SignaturePattern {
    pub literal: String,
    pub cooldown_posts: u32,
}

#[derive(Debug, Clone)]
pub struct FrequentPattern {
    pub literal: String,
    pub max_consecutive: u32,
}

#[derive(Debug, Clone)]
pub struct FillerPattern {
    pub literal: String,
    pub max_per_post: u32,
    pub min_per_post: u32,
}

#[derive(Debug, Clone)]
pub struct ContextualPattern {
    pub literal: String,
    pub avoid_in_contexts: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PatternRegistry {
    pub signature: Vec<SignaturePattern>,
    pub frequent: Vec<FrequentPattern>,
    pub filler: Vec<FillerPattern>,
    pub contextual: Vec<ContextualPattern>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    SignatureCooldown { literal: String, posts_remaining: u32 },
    FrequentOveruse { literal: String, max_consecutive: u32 },
    FillerCapExceeded { literal: String, count: u32, max: u32 },
    ContextualAvoid { literal: String, context_tag: String },
    ForbiddenCharacters,
}

pub struct PatternTracker {
    registry: PatternRegistry,
    /// Last N recorded consecutive-use literals, per frequent pattern, for
    /// the `max_consecutive` check.
    recent_frequent_uses: HashMap<String, u32>,
}

impl PatternTracker {
    pub fn new(registry: PatternRegistry) -> Self {
        Self {
            registry,
            recent_frequent_uses: HashMap::new(),
        }
    }

    /// Enumerates every violation `text` would trigger. `posts_since_used`
    /// resolves, for a given literal, how many posts have elapsed since it
    /// was last used (needed for the signature cooldown check).
    pub fn check_violations(
        &self,
        text: &str,
        context_tag: Option<&str>,
        posts_since_used: impl Fn(&str) -> u32,
    ) -> Vec<Violation> {
        let mut violations = Vec::new();

        if contains_forbidden_characters(text) {
            violations.push(Violation::ForbiddenCharacters);
        }

        for sig in &self.registry.signature {
            if sig.cooldown_posts == 0 || !text.contains(&sig.literal) {
                continue;
            }
            let since = posts_since_used(&sig.literal);
            if since < sig.cooldown_posts {
                violations.push(Violation::SignatureCooldown {
                    literal: sig.literal.clone(),
                    posts_remaining: sig.cooldown_posts - since,
                });
            }
        }

        for freq in &self.registry.frequent {
            if !text.contains(&freq.literal) {
                continue;
            }
            let consecutive = self.recent_frequent_uses.get(&freq.literal).copied().unwrap_or(0);
            if consecutive + 1 > freq.max_consecutive {
                violations.push(Violation::FrequentOveruse {
                    literal: freq.literal.clone(),
                    max_consecutive: freq.max_consecutive,
                });
            }
        }

        for filler in &self.registry.filler {
            let count = text.matches(&filler.literal).count() as u32;
            if count > filler.max_per_post {
                violations.push(Violation::FillerCapExceeded {
                    literal: filler.literal.clone(),
                    count,
                    max: filler.max_per_post,
                });
            }
        }

        if let Some(tag) = context_tag {
            for ctx in &self.registry.contextual {
                if text.contains(&ctx.literal) && ctx.avoid_in_contexts.iter().any(|c| c == tag) {
                    violations.push(Violation::ContextualAvoid {
                        literal: ctx.literal.clone(),
                        context_tag: tag.to_string(),
                    });
                }
            }
        }

        violations
    }

    /// Records every pattern occurrence detected in `text` against `post_id`.
    pub fn record_usage(&mut self, text: &str, post_id: &str, now: DateTime<Utc>) -> Vec<PatternUsage> {
        let mut recorded = Vec::new();

        for sig in &self.registry.signature {
            if text.contains(&sig.literal) {
                recorded.push(PatternUsage {
                    pattern_type: PatternType::Signature,
                    pattern_literal: sig.literal.clone(),
                    post_id: post_id.to_string(),
                    used_at: now,
                });
            }
        }
        for freq in &self.registry.frequent {
            if text.contains(&freq.literal) {
                *self.recent_frequent_uses.entry(freq.literal.clone()).or_insert(0) += 1;
                recorded.push(PatternUsage {
                    pattern_type: PatternType::Frequent,
                    pattern_literal: freq.literal.clone(),
                    post_id: post_id.to_string(),
                    used_at: now,
                });
            } else {
                self.recent_frequent_uses.insert(freq.literal.clone(), 0);
            }
        }
        for filler in &self.registry.filler {
            if text.contains(&filler.literal) {
                recorded.push(PatternUsage {
                    pattern_type: PatternType::Filler,
                    pattern_literal: filler.literal.clone(),
                    post_id: post_id.to_string(),
                    used_at: now,
                });
            }
        }
        for ctx in &self.registry.contextual {
            if text.contains(&ctx.literal) {
                recorded.push(PatternUsage {
                    pattern_type: PatternType::Contextual,
                    pattern_literal: ctx.literal.clone(),
                    post_id: post_id.to_string(),
                    used_at: now,
                });
            }
        }
        recorded
    }

    pub fn format_violations_for_llm(violations: &[Violation]) -> String {
        if violations.is_empty() {
            return String::new();
        }
        let mut lines = vec!["Regenerate, avoiding:".to_string()];
        for v in violations {
            let line = match v {
                Violation::SignatureCooldown { literal, posts_remaining } => {
                    format!("- \"{literal}\" is on cooldown for {posts_remaining} more post(s)")
                }
                Violation::FrequentOveruse { literal, max_consecutive } => {
                    format!("- \"{literal}\" used too many times in a row (max {max_consecutive})")
                }
                Violation::FillerCapExceeded { literal, count, max } => {
                    format!("- \"{literal}\" appears {count} times, cap is {max}")
                }
                Violation::ContextualAvoid { literal, context_tag } => {
                    format!("- \"{literal}\" is not appropriate for context \"{context_tag}\"")
                }
                Violation::ForbiddenCharacters => "- remove CJK/kana characters".to_string(),
            };
            lines.push(line);
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forbidden_characters_are_flagged() {
        let tracker = PatternTracker::new(PatternRegistry::default());
        let violations = tracker.check_violations("hello 世界", None, |_| 99);
        assert!(violations.contains(&Violation::ForbiddenCharacters));
    }

    #[test]
    fn signature_cooldown_violation_when_used_too_recently() {
        let registry = PatternRegistry {
            signature: vec![SignaturePattern {
                literal: "kimchi o'clock".into(),
                cooldown_posts: 5,
            }],
            ..Default::default()
        };
        let tracker = PatternTracker::new(registry);
        let violations = tracker.check_violations("it's kimchi o'clock again", None, |_| 2);
        assert!(matches!(violations[0], Violation::SignatureCooldown { posts_remaining: 3, .. }));
    }

    #[test]
    fn filler_cap_exceeded_when_overused() {
        let registry = PatternRegistry {
            filler: vec![FillerPattern {
                literal: "lol".into(),
                max_per_post: 1,
                min_per_post: 0,
            }],
            ..Default::default()
        };
        let tracker = PatternTracker::new(registry);
        let violations = tracker.check_violations("lol lol", None, |_| 99);
        assert!(violations
            .iter()
            .any(|v| matches!(v, Violation::FillerCapExceeded { count: 2, max: 1, .. })));
    }

    #[test]
    fn record_usage_then_check_violations_reports_cooldown() {
        let registry = PatternRegistry {
            signature: vec![SignaturePattern {
                literal: "ferment responsibly".into(),
                cooldown_posts: 3,
            }],
            ..Default::default()
        };
        let mut tracker = PatternTracker::new(registry);
        let now = Utc::now();
        tracker.record_usage("ferment responsibly, friends", "post-1", now);
        let violations = tracker.check_violations("ferment responsibly, friends", None, |_| 0);
        assert!(violations
            .iter()
            .any(|v| matches!(v, Violation::SignatureCooldown { .. })));
    }
}
