//! NotificationJourney (§4.13): fetch, classify, dedup, prioritise, and
//! dispatch at most `process_limit` notifications to a scenario.

use pf_core::{AgentError, EpisodeType};
use pf_llm::{Notification, NotificationType, SocialPlatformAdapter};
use rand::Rng;

use crate::scenario::{run_scenario, ScenarioDeps, ScenarioResult};

fn priority(kind: NotificationType) -> u8 {
    match kind {
        NotificationType::Reply => 1,
        NotificationType::Mention => 2,
        NotificationType::Quote => 3,
        NotificationType::Follow => 4,
        NotificationType::Like => 10,
        NotificationType::Repost => 10,
    }
}

pub struct NotificationJourney<'a> {
    pub deps: &'a ScenarioDeps<'a>,
    pub persona_context: &'a str,
}

impl<'a> NotificationJourney<'a> {
    /// Fetches up to `fetch_n` notifications, filters out ones already
    /// processed, sorts by priority then arrival, and runs the scenario
    /// for the top `process_limit` (default 1).
    pub async fn run(
        &self,
        fetch_n: usize,
        process_limit: usize,
        rng: &mut impl Rng,
    ) -> Result<Vec<ScenarioResult>, AgentError> {
        let notifications = self
            .deps
            .adapter
            .get_all_notifications(fetch_n)
            .await
            .map_err(|e| AgentError::from_platform_signal(&e.to_string()))?;

        let mut unprocessed: Vec<Notification> = Vec::new();
        for n in notifications {
            let already = self.deps.store.is_notification_processed(&n.id).map_err(AgentError::Storage)?;
            if !already {
                unprocessed.push(n);
            }
        }

        unprocessed.sort_by(|a, b| {
            priority(a.notification_type)
                .cmp(&priority(b.notification_type))
                .then(a.created_at.cmp(&b.created_at))
        });

        let mut results = Vec::new();
        for notification in unprocessed.into_iter().take(process_limit) {
            self.deps
                .store
                .mark_notification_processed(&notification.id)
                .map_err(AgentError::Storage)?;

            let Some(post_id) = &notification.post_id else {
                results.push(ScenarioResult::acted(
                    crate::scenario::ScenarioAction::Acknowledged,
                    None,
                ));
                continue;
            };
            let Some(post) = self
                .deps
                .adapter
                .get_post(post_id)
                .await
                .map_err(|e| AgentError::from_platform_signal(&e.to_string()))?
            else {
                continue;
            };

            let conversation_type = match notification.notification_type {
                NotificationType::Reply => "reply",
                NotificationType::Mention => "mention",
                NotificationType::Quote => "quote",
                NotificationType::Follow => "follow",
                NotificationType::Like => "like",
                NotificationType::Repost => "repost",
            };

            let recent_replies: Vec<String> = self
                .deps
                .store
                .recent_episodes(Some(EpisodeType::Replied), 5)
                .map_err(AgentError::Storage)?
                .into_iter()
                .map(|e| e.content)
                .collect();

            let result =
                run_scenario(self.deps, &post, conversation_type, self.persona_context, &recent_replies, rng).await?;
            results.push(result);
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_table_matches_spec() {
        assert_eq!(priority(NotificationType::Reply), 1);
        assert_eq!(priority(NotificationType::Mention), 2);
        assert_eq!(priority(NotificationType::Quote), 3);
        assert_eq!(priority(NotificationType::Follow), 4);
        assert_eq!(priority(NotificationType::Like), 10);
        assert_eq!(priority(NotificationType::Repost), 10);
    }
}
