//! SQLite persistence layer for every entity in the data model (§3).
//!
//! Each table stores the entity as a JSON blob alongside the columns
//! needed for the query patterns the rest of the system relies on
//! (tier, strength, timestamps, topic). The JSON blob is the source of
//! truth; indexed columns exist purely for filtering and are kept in
//! sync on every write. All per-entity mutations go through a single
//! mutex-guarded connection, which gives the "at-most-one-writer per
//! entity id within a session" semantics the store is required to
//! provide.

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use pf_core::{
    ConversationRecord, CoreMemory, Episode, EpisodeType, Inspiration, KnowledgeEntry,
    PatternUsage, PersonMemory, PostingHistoryEntry, Tier,
};

pub struct MemoryStore {
    conn: Mutex<Connection>,
}

/// Filters accepted by [`MemoryStore::ready_inspirations`].
#[derive(Debug, Clone, Default)]
pub struct ReadyInspirationFilter {
    pub min_strength: f32,
    pub tiers: Vec<Tier>,
    pub matured_since: Option<DateTime<Utc>>,
    pub cooldown_days: i64,
    pub limit: usize,
}

impl MemoryStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).context("opening memory store database")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("opening in-memory memory store")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS episodes (
                id TEXT PRIMARY KEY,
                episode_type TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                data_json TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_episodes_type_time ON episodes(episode_type, timestamp DESC);

            CREATE TABLE IF NOT EXISTS inspirations (
                id TEXT PRIMARY KEY,
                topic TEXT NOT NULL,
                tier TEXT NOT NULL,
                strength REAL NOT NULL,
                created_at INTEGER NOT NULL,
                used_count INTEGER NOT NULL,
                last_used_at INTEGER,
                data_json TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_insp_topic ON inspirations(topic);
            CREATE INDEX IF NOT EXISTS idx_insp_tier_strength ON inspirations(tier, strength DESC);

            CREATE TABLE IF NOT EXISTS core_memories (
                id TEXT PRIMARY KEY,
                created_at INTEGER NOT NULL,
                data_json TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS persons (
                id TEXT PRIMARY KEY,
                platform_user_id TEXT NOT NULL UNIQUE,
                data_json TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                person_id TEXT NOT NULL,
                post_id TEXT NOT NULL,
                state TEXT NOT NULL,
                data_json TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_conv_person_post ON conversations(person_id, post_id);

            CREATE TABLE IF NOT EXISTS posting_history (
                id TEXT PRIMARY KEY,
                posted_at INTEGER NOT NULL,
                data_json TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_posting_time ON posting_history(posted_at DESC);

            CREATE TABLE IF NOT EXISTS pattern_usage (
                rowid INTEGER PRIMARY KEY AUTOINCREMENT,
                pattern_literal TEXT NOT NULL,
                post_id TEXT NOT NULL,
                used_at INTEGER NOT NULL,
                data_json TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_pattern_literal_time ON pattern_usage(pattern_literal, used_at DESC);

            CREATE TABLE IF NOT EXISTS knowledge (
                keyword TEXT PRIMARY KEY,
                expires_at INTEGER NOT NULL,
                data_json TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS processed_notifications (
                notification_id TEXT PRIMARY KEY,
                processed_at INTEGER NOT NULL
            );
            "#,
        )
        .context("initializing memory store schema")?;
        Ok(())
    }

    // ---------------------------------------------------------------
    // Episodes
    // ---------------------------------------------------------------

    pub fn insert_episode(&self, episode: &Episode) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO episodes (id, episode_type, timestamp, data_json) VALUES (?1, ?2, ?3, ?4)",
            params![
                episode.id,
                episode_type_str(episode.episode_type),
                episode.timestamp.timestamp(),
                serde_json::to_string(episode)?,
            ],
        )?;
        Ok(())
    }

    pub fn get_episode(&self, id: &str) -> Result<Option<Episode>> {
        let conn = self.conn.lock().unwrap();
        let json: Option<String> = conn
            .query_row("SELECT data_json FROM episodes WHERE id = ?1", [id], |r| {
                r.get(0)
            })
            .optional()?;
        Ok(json.map(|j| serde_json::from_str(&j)).transpose()?)
    }

    pub fn recent_episodes(&self, episode_type: Option<EpisodeType>, limit: usize) -> Result<Vec<Episode>> {
        let conn = self.conn.lock().unwrap();
        let rows: Vec<String> = if let Some(et) = episode_type {
            let mut stmt = conn.prepare(
                "SELECT data_json FROM episodes WHERE episode_type = ?1 ORDER BY timestamp DESC LIMIT ?2",
            )?;
            let result = stmt
                .query_map(params![episode_type_str(et), limit as i64], |r| r.get(0))?
                .collect::<Result<_, _>>()?;
            result
        } else {
            let mut stmt =
                conn.prepare("SELECT data_json FROM episodes ORDER BY timestamp DESC LIMIT ?1")?;
            let result = stmt
                .query_map(params![limit as i64], |r| r.get(0))?
                .collect::<Result<_, _>>()?;
            result
        };
        rows.into_iter()
            .map(|j| serde_json::from_str(&j).map_err(Into::into))
            .collect()
    }

    // ---------------------------------------------------------------
    // Inspirations
    // ---------------------------------------------------------------

    pub fn insert_inspiration(&self, insp: &Inspiration) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO inspirations (id, topic, tier, strength, created_at, used_count, last_used_at, data_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                insp.id,
                insp.topic,
                tier_str(insp.tier),
                insp.strength,
                insp.created_at.timestamp(),
                insp.used_count,
                insp.last_used_at.map(|t| t.timestamp()),
                serde_json::to_string(insp)?,
            ],
        )?;
        Ok(())
    }

    pub fn update_inspiration(&self, insp: &Inspiration) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE inspirations SET topic = ?2, tier = ?3, strength = ?4, used_count = ?5,
                last_used_at = ?6, data_json = ?7 WHERE id = ?1",
            params![
                insp.id,
                insp.topic,
                tier_str(insp.tier),
                insp.strength,
                insp.used_count,
                insp.last_used_at.map(|t| t.timestamp()),
                serde_json::to_string(insp)?,
            ],
        )?;
        Ok(())
    }

    pub fn delete_inspiration(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM inspirations WHERE id = ?1", [id])?;
        Ok(())
    }

    pub fn get_inspiration(&self, id: &str) -> Result<Option<Inspiration>> {
        let conn = self.conn.lock().unwrap();
        let json: Option<String> = conn
            .query_row(
                "SELECT data_json FROM inspirations WHERE id = ?1",
                [id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(json.map(|j| serde_json::from_str(&j)).transpose()?)
    }

    pub fn find_inspiration_by_topic(&self, topic: &str) -> Result<Option<Inspiration>> {
        let conn = self.conn.lock().unwrap();
        let json: Option<String> = conn
            .query_row(
                "SELECT data_json FROM inspirations WHERE topic = ?1 LIMIT 1",
                [topic],
                |r| r.get(0),
            )
            .optional()?;
        Ok(json.map(|j| serde_json::from_str(&j)).transpose()?)
    }

    pub fn all_inspirations(&self) -> Result<Vec<Inspiration>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT data_json FROM inspirations")?;
        let rows: Vec<String> = stmt.query_map([], |r| r.get(0))?.collect::<Result<_, _>>()?;
        rows.into_iter()
            .map(|j| serde_json::from_str(&j).map_err(Into::into))
            .collect()
    }

    pub fn inspirations_in_tier(&self, tier: Tier) -> Result<Vec<Inspiration>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT data_json FROM inspirations WHERE tier = ?1 ORDER BY strength ASC")?;
        let rows: Vec<String> = stmt
            .query_map([tier_str(tier)], |r| r.get(0))?
            .collect::<Result<_, _>>()?;
        rows.into_iter()
            .map(|j| serde_json::from_str(&j).map_err(Into::into))
            .collect()
    }

    pub fn count_by_tier(&self, tier: Tier) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM inspirations WHERE tier = ?1",
            [tier_str(tier)],
            |r| r.get(0),
        )?;
        Ok(count as usize)
    }

    /// Applies the maturation/cooldown/strength filter from §4.4 and
    /// returns candidates ordered by strength descending, capped at
    /// `filter.limit`.
    pub fn ready_inspirations(&self, filter: &ReadyInspirationFilter) -> Result<Vec<Inspiration>> {
        let all = self.all_inspirations()?;
        let now = Utc::now();
        let mut matched: Vec<Inspiration> = all
            .into_iter()
            .filter(|i| i.strength >= filter.min_strength)
            .filter(|i| filter.tiers.is_empty() || filter.tiers.contains(&i.tier))
            .filter(|i| match filter.matured_since {
                Some(threshold) => i.created_at <= threshold,
                None => true,
            })
            .filter(|i| match i.last_used_at {
                None => true,
                Some(last_used) => {
                    (now - last_used).num_days() >= filter.cooldown_days
                }
            })
            .collect();
        matched.sort_by(|a, b| b.strength.partial_cmp(&a.strength).unwrap());
        if filter.limit > 0 {
            matched.truncate(filter.limit);
        }
        Ok(matched)
    }

    // ---------------------------------------------------------------
    // Core memories
    // ---------------------------------------------------------------

    pub fn insert_core_memory(&self, core: &CoreMemory) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO core_memories (id, created_at, data_json) VALUES (?1, ?2, ?3)",
            params![core.id, core.created_at.timestamp(), serde_json::to_string(core)?],
        )?;
        Ok(())
    }

    pub fn list_core_memories(&self) -> Result<Vec<CoreMemory>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT data_json FROM core_memories ORDER BY created_at ASC")?;
        let rows: Vec<String> = stmt.query_map([], |r| r.get(0))?.collect::<Result<_, _>>()?;
        rows.into_iter()
            .map(|j| serde_json::from_str(&j).map_err(Into::into))
            .collect()
    }

    // ---------------------------------------------------------------
    // Persons / relationships
    // ---------------------------------------------------------------

    pub fn get_or_create_person(&self, platform_user_id: &str, screen_name: &str) -> Result<PersonMemory> {
        let conn = self.conn.lock().unwrap();
        let existing: Option<String> = conn
            .query_row(
                "SELECT data_json FROM persons WHERE platform_user_id = ?1",
                [platform_user_id],
                |r| r.get(0),
            )
            .optional()?;
        if let Some(json) = existing {
            return Ok(serde_json::from_str(&json)?);
        }
        let person = PersonMemory::new(platform_user_id, screen_name);
        conn.execute(
            "INSERT INTO persons (id, platform_user_id, data_json) VALUES (?1, ?2, ?3)",
            params![person.id, person.platform_user_id, serde_json::to_string(&person)?],
        )?;
        Ok(person)
    }

    pub fn update_person(&self, person: &PersonMemory) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE persons SET data_json = ?2 WHERE id = ?1",
            params![person.id, serde_json::to_string(person)?],
        )?;
        Ok(())
    }

    pub fn get_person(&self, id: &str) -> Result<Option<PersonMemory>> {
        let conn = self.conn.lock().unwrap();
        let json: Option<String> = conn
            .query_row("SELECT data_json FROM persons WHERE id = ?1", [id], |r| r.get(0))
            .optional()?;
        Ok(json.map(|j| serde_json::from_str(&j)).transpose()?)
    }

    // ---------------------------------------------------------------
    // Conversations
    // ---------------------------------------------------------------

    pub fn insert_conversation(&self, conv: &ConversationRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO conversations (id, person_id, post_id, state, data_json) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                conv.id,
                conv.person_id,
                conv.post_id,
                conversation_state_str(conv.state),
                serde_json::to_string(conv)?,
            ],
        )?;
        Ok(())
    }

    pub fn update_conversation(&self, conv: &ConversationRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE conversations SET state = ?2, data_json = ?3 WHERE id = ?1",
            params![conv.id, conversation_state_str(conv.state), serde_json::to_string(conv)?],
        )?;
        Ok(())
    }

    pub fn ongoing_conversation_for(
        &self,
        person_id: &str,
        post_id: &str,
    ) -> Result<Option<ConversationRecord>> {
        let conn = self.conn.lock().unwrap();
        let json: Option<String> = conn
            .query_row(
                "SELECT data_json FROM conversations WHERE person_id = ?1 AND post_id = ?2 AND state = 'ongoing' LIMIT 1",
                params![person_id, post_id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(json.map(|j| serde_json::from_str(&j)).transpose()?)
    }

    pub fn ongoing_conversation_count_for_person(&self, person_id: &str) -> Result<u32> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM conversations WHERE person_id = ?1 AND state = 'ongoing'",
            [person_id],
            |r| r.get(0),
        )?;
        Ok(count as u32)
    }

    // ---------------------------------------------------------------
    // Posting history
    // ---------------------------------------------------------------

    pub fn insert_posting_history(&self, entry: &PostingHistoryEntry) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO posting_history (id, posted_at, data_json) VALUES (?1, ?2, ?3)",
            params![entry.id, entry.posted_at.timestamp(), serde_json::to_string(entry)?],
        )?;
        Ok(())
    }

    pub fn top_n_posting_history(&self, n: usize) -> Result<Vec<PostingHistoryEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT data_json FROM posting_history ORDER BY posted_at DESC LIMIT ?1")?;
        let rows: Vec<String> = stmt.query_map([n as i64], |r| r.get(0))?.collect::<Result<_, _>>()?;
        rows.into_iter()
            .map(|j| serde_json::from_str(&j).map_err(Into::into))
            .collect()
    }

    pub fn posts_since(&self, since: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM posting_history WHERE posted_at >= ?1",
            [since.timestamp()],
            |r| r.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn last_post_time(&self) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn.lock().unwrap();
        let ts: Option<i64> = conn
            .query_row(
                "SELECT posted_at FROM posting_history ORDER BY posted_at DESC LIMIT 1",
                [],
                |r| r.get(0),
            )
            .optional()?;
        Ok(ts.and_then(|t| DateTime::from_timestamp(t, 0)))
    }

    // ---------------------------------------------------------------
    // Pattern usage
    // ---------------------------------------------------------------

    pub fn insert_pattern_usage(&self, usage: &PatternUsage) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO pattern_usage (pattern_literal, post_id, used_at, data_json) VALUES (?1, ?2, ?3, ?4)",
            params![
                usage.pattern_literal,
                usage.post_id,
                usage.used_at.timestamp(),
                serde_json::to_string(usage)?,
            ],
        )?;
        Ok(())
    }

    pub fn pattern_usage_since(
        &self,
        pattern_literal: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<PatternUsage>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT data_json FROM pattern_usage WHERE pattern_literal = ?1 AND used_at >= ?2 ORDER BY used_at DESC",
        )?;
        let rows: Vec<String> = stmt
            .query_map(params![pattern_literal, since.timestamp()], |r| r.get(0))?
            .collect::<Result<_, _>>()?;
        rows.into_iter()
            .map(|j| serde_json::from_str(&j).map_err(Into::into))
            .collect()
    }

    /// Count of posts made since `pattern_literal` was last recorded —
    /// used to enforce a signature's `cooldown_posts`.
    pub fn posts_since_pattern_used(&self, pattern_literal: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let last_used: Option<i64> = conn
            .query_row(
                "SELECT used_at FROM pattern_usage WHERE pattern_literal = ?1 ORDER BY used_at DESC LIMIT 1",
                [pattern_literal],
                |r| r.get(0),
            )
            .optional()?;
        match last_used {
            None => Ok(usize::MAX),
            Some(ts) => {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM posting_history WHERE posted_at > ?1",
                    [ts],
                    |r| r.get(0),
                )?;
                Ok(count as usize)
            }
        }
    }

    // ---------------------------------------------------------------
    // Knowledge cache
    // ---------------------------------------------------------------

    pub fn upsert_knowledge(&self, entry: &KnowledgeEntry) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO knowledge (keyword, expires_at, data_json) VALUES (?1, ?2, ?3)
             ON CONFLICT(keyword) DO UPDATE SET expires_at = excluded.expires_at, data_json = excluded.data_json",
            params![entry.keyword, entry.expires_at.timestamp(), serde_json::to_string(entry)?],
        )?;
        Ok(())
    }

    pub fn get_knowledge(&self, keyword: &str) -> Result<Option<KnowledgeEntry>> {
        let conn = self.conn.lock().unwrap();
        let json: Option<String> = conn
            .query_row(
                "SELECT data_json FROM knowledge WHERE keyword = ?1 AND expires_at > ?2",
                params![keyword, Utc::now().timestamp()],
                |r| r.get(0),
            )
            .optional()?;
        Ok(json.map(|j| serde_json::from_str(&j)).transpose()?)
    }

    // ---------------------------------------------------------------
    // Notification dedup (§8: persisted indefinitely unless a TTL is
    // introduced; see DESIGN.md for the chosen policy)
    // ---------------------------------------------------------------

    pub fn mark_notification_processed(&self, notification_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO processed_notifications (notification_id, processed_at) VALUES (?1, ?2)",
            params![notification_id, Utc::now().timestamp()],
        )?;
        Ok(())
    }

    pub fn is_notification_processed(&self, notification_id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM processed_notifications WHERE notification_id = ?1",
                [notification_id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(exists.is_some())
    }
}

fn episode_type_str(t: EpisodeType) -> &'static str {
    match t {
        EpisodeType::SawPost => "saw_post",
        EpisodeType::Replied => "replied",
        EpisodeType::Liked => "liked",
        EpisodeType::Posted => "posted",
        EpisodeType::Searched => "searched",
    }
}

fn tier_str(t: Tier) -> &'static str {
    match t {
        Tier::Ephemeral => "ephemeral",
        Tier::ShortTerm => "short_term",
        Tier::LongTerm => "long_term",
        Tier::Core => "core",
    }
}

fn conversation_state_str(s: pf_core::ConversationState) -> &'static str {
    match s {
        pf_core::ConversationState::Ongoing => "ongoing",
        pf_core::ConversationState::Concluded => "concluded",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pf_core::{Sentiment, Urgency};

    fn store() -> MemoryStore {
        MemoryStore::in_memory().unwrap()
    }

    #[test]
    fn episode_round_trip() {
        let s = store();
        let ep = Episode::new(EpisodeType::SawPost, "hello", vec!["food".into()], Sentiment::Positive, 0.5);
        s.insert_episode(&ep).unwrap();
        let fetched = s.get_episode(&ep.id).unwrap().unwrap();
        assert_eq!(fetched.content, "hello");
    }

    #[test]
    fn inspiration_lookup_by_topic() {
        let s = store();
        let insp = Inspiration::new(None, "trig", "Kimchi", "angle", Urgency::Flash, 0.9);
        s.insert_inspiration(&insp).unwrap();
        let found = s.find_inspiration_by_topic("kimchi").unwrap().unwrap();
        assert_eq!(found.id, insp.id);
    }

    #[test]
    fn ready_inspirations_respects_min_strength_and_limit() {
        let s = store();
        for i in 0..5 {
            let mut insp = Inspiration::new(
                None,
                "trig",
                format!("topic{i}"),
                "angle",
                Urgency::Flash,
                0.5,
            );
            insp.strength = 0.1 * (i as f32 + 1.0);
            insp.tier = Tier::LongTerm;
            s.insert_inspiration(&insp).unwrap();
        }
        let filter = ReadyInspirationFilter {
            min_strength: 0.3,
            tiers: vec![Tier::LongTerm],
            matured_since: None,
            cooldown_days: 0,
            limit: 2,
        };
        let ready = s.ready_inspirations(&filter).unwrap();
        assert_eq!(ready.len(), 2);
        assert!(ready[0].strength >= ready[1].strength);
    }

    #[test]
    fn notification_dedup_is_idempotent() {
        let s = store();
        assert!(!s.is_notification_processed("n1").unwrap());
        s.mark_notification_processed("n1").unwrap();
        s.mark_notification_processed("n1").unwrap();
        assert!(s.is_notification_processed("n1").unwrap());
    }

    #[test]
    fn get_or_create_person_is_idempotent() {
        let s = store();
        let a = s.get_or_create_person("u1", "alice").unwrap();
        let b = s.get_or_create_person("u1", "alice-renamed").unwrap();
        assert_eq!(a.id, b.id);
    }
}
