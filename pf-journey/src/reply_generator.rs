//! ReplyGenerator (§4.13 step 4): generates reply text, rejecting
//! candidates that repeat too much of the last few replies.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use pf_llm::LlmProvider;

const MAX_ATTEMPTS: u32 = 3;
const NOVELTY_THRESHOLD: f32 = 0.5;

pub struct ReplyGenerator {
    llm: Arc<dyn LlmProvider>,
}

impl ReplyGenerator {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Generates a reply, regenerating up to `MAX_ATTEMPTS` times if the
    /// candidate shares too many words with the last five replies. Returns
    /// the final attempt even if it never clears the novelty bar.
    pub async fn generate(&self, prompt: &str, recent_replies: &[String]) -> Result<String> {
        let mut last = String::new();
        for _attempt in 0..MAX_ATTEMPTS {
            let candidate = self.llm.generate(prompt, Some("You write a single social reply."), None).await?;
            if novelty_ratio(&candidate, recent_replies) >= NOVELTY_THRESHOLD {
                return Ok(candidate);
            }
            last = candidate;
        }
        Ok(last)
    }
}

fn words(text: &str) -> HashSet<String> {
    text.split_whitespace().map(|w| w.to_lowercase()).collect()
}

/// Fraction of `candidate`'s words not present in any of `recent`. A
/// candidate sharing nothing with recent replies scores 1.0; one that
/// repeats every word scores 0.0.
fn novelty_ratio(candidate: &str, recent: &[String]) -> f32 {
    let candidate_words = words(candidate);
    if candidate_words.is_empty() {
        return 0.0;
    }
    let seen: HashSet<String> = recent.iter().flat_map(|r| words(r)).collect();
    let novel = candidate_words.iter().filter(|w| !seen.contains(*w)).count();
    novel as f32 / candidate_words.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ScriptedLlm(Mutex<Vec<String>>);

    #[async_trait]
    impl LlmProvider for ScriptedLlm {
        async fn generate(&self, _prompt: &str, _system_prompt: Option<&str>, _model: Option<&str>) -> Result<String> {
            let mut scripts = self.0.lock().unwrap();
            Ok(scripts.remove(0))
        }
    }

    #[tokio::test]
    async fn accepts_first_sufficiently_novel_candidate() {
        let llm = Arc::new(ScriptedLlm(Mutex::new(vec!["totally fresh unique words here".to_string()])));
        let gen = ReplyGenerator::new(llm);
        let recent = vec!["kimchi is great today".to_string()];
        let reply = gen.generate("prompt", &recent).await.unwrap();
        assert_eq!(reply, "totally fresh unique words here");
    }

    #[tokio::test]
    async fn regenerates_when_candidate_echoes_recent_replies() {
        let llm = Arc::new(ScriptedLlm(Mutex::new(vec![
            "kimchi is great today".to_string(),
            "kimchi is great today".to_string(),
            "something entirely different now".to_string(),
        ])));
        let gen = ReplyGenerator::new(llm);
        let recent = vec!["kimchi is great today".to_string()];
        let reply = gen.generate("prompt", &recent).await.unwrap();
        assert_eq!(reply, "something entirely different now");
    }

    #[test]
    fn novelty_ratio_is_zero_for_identical_text() {
        let recent = vec!["the quick brown fox".to_string()];
        assert_eq!(novelty_ratio("the quick brown fox", &recent), 0.0);
    }

    #[test]
    fn novelty_ratio_is_one_for_disjoint_text() {
        let recent = vec!["the quick brown fox".to_string()];
        assert_eq!(novelty_ratio("completely different sentence entirely", &recent), 1.0);
    }
}
