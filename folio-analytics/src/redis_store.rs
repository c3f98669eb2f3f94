//! Redis aggregate store.
//!
//! Layout under the configured prefix:
//!
//! ```text
//! {prefix}:agg:{profile}:{day}            hash    id, day, views, total_duration
//! {prefix}:agg:{profile}:{day}:device     hash    device -> count
//! {prefix}:agg:{profile}:{day}:referrer   hash    referrer -> count
//! {prefix}:agg:{profile}:{day}:project    hash    item id -> count
//! {prefix}:agg:{profile}:{day}:visitors   set     fingerprints
//! {prefix}:days:{profile}                 zset    record key scored by day
//! {prefix}:ids                            hash    record id -> record key
//! {prefix}:next_id                        string  id sequence
//! ```
//!
//! Counters and histogram entries use `HINCRBY` and visitors use `SADD`, so
//! every update is atomic on the server. A range query reads all of its
//! records back in a single `MULTI`/`EXEC` block.

use crate::{
    AggregateId, AggregateKey, AggregateStore, AnalyticsError, AnalyticsResult, Counters,
    DailyAggregate, DayKey, DayRange, HistogramField, ProfileId, VisitorFingerprint,
};
use async_trait::async_trait;
use redis::{AsyncCommands, Client, FromRedisValue, Script, Value, aio::ConnectionManager};
use std::collections::{HashMap, HashSet};

/// Creates the record with the seed or increments the existing one.
const UPSERT_SCRIPT: &str = r#"
local record = KEYS[1]
if redis.call('EXISTS', record) == 0 then
  local id = redis.call('INCR', KEYS[2])
  redis.call('HSET', record, 'id', id, 'day', ARGV[5], 'views', ARGV[1], 'total_duration', ARGV[2])
  redis.call('HSET', KEYS[3], id, record)
  redis.call('ZADD', KEYS[4], ARGV[5], record)
  return id
end
redis.call('HINCRBY', record, 'views', ARGV[3])
redis.call('HINCRBY', record, 'total_duration', ARGV[4])
return tonumber(redis.call('HGET', record, 'id'))
"#;

/// Connection settings for [`RedisAggregateStore`].
#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    pub url: String,
    pub key_prefix: String,
}

impl RedisStoreConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            key_prefix: "folio:analytics".to_string(),
        }
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn build_key(&self, key: &str) -> String {
        if self.key_prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}:{}", self.key_prefix, key)
        }
    }
}

/// Redis-backed [`AggregateStore`].
#[derive(Clone)]
pub struct RedisAggregateStore {
    connection: ConnectionManager,
    config: RedisStoreConfig,
    upsert: Script,
}

impl RedisAggregateStore {
    /// Connect to the server named in `config`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use folio_analytics::*;
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), AnalyticsError> {
    ///     let config = RedisStoreConfig::new("redis://localhost:6379");
    ///     let store = RedisAggregateStore::new(config).await?;
    ///     Ok(())
    /// }
    /// ```
    pub async fn new(config: RedisStoreConfig) -> AnalyticsResult<Self> {
        let client =
            Client::open(config.url.as_str()).map_err(|e| AnalyticsError::Store(e.to_string()))?;

        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| AnalyticsError::Store(e.to_string()))?;

        Ok(Self {
            connection,
            config,
            upsert: Script::new(UPSERT_SCRIPT),
        })
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    fn record_key(&self, key: &AggregateKey) -> String {
        self.config
            .build_key(&format!("agg:{}:{}", key.profile_id, key.day.days_since_epoch()))
    }

    fn days_key(&self, profile_id: &ProfileId) -> String {
        self.config.build_key(&format!("days:{profile_id}"))
    }

    async fn record_key_for(&self, id: AggregateId) -> AnalyticsResult<String> {
        let mut conn = self.connection.clone();
        let key: Option<String> = conn.hget(self.config.build_key("ids"), id.0).await?;
        key.ok_or(AnalyticsError::RecordNotFound(id.0))
    }

    async fn load(
        &self,
        profile_id: &ProfileId,
        record_key: &str,
    ) -> AnalyticsResult<Option<DailyAggregate>> {
        let mut rows = self.load_many(profile_id, &[record_key.to_string()]).await?;
        Ok(rows.pop())
    }

    /// Read every record in one `MULTI`/`EXEC` round trip, skipping missing ones.
    async fn load_many(
        &self,
        profile_id: &ProfileId,
        record_keys: &[String],
    ) -> AnalyticsResult<Vec<DailyAggregate>> {
        if record_keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for record_key in record_keys {
            pipe.hgetall(record_key)
                .hgetall(histogram_key(record_key, HistogramField::DeviceStats))
                .hgetall(histogram_key(record_key, HistogramField::ReferrerStats))
                .hgetall(histogram_key(record_key, HistogramField::ProjectInteractions))
                .smembers(visitors_key(record_key));
        }

        let mut conn = self.connection.clone();
        let replies: Vec<Value> = pipe.query_async(&mut conn).await?;
        if replies.len() != record_keys.len() * READS_PER_RECORD {
            return Err(AnalyticsError::Store(format!(
                "expected {} replies, got {}",
                record_keys.len() * READS_PER_RECORD,
                replies.len()
            )));
        }

        let mut replies = replies.into_iter();
        let mut rows = Vec::with_capacity(record_keys.len());
        for record_key in record_keys {
            let mut next = || replies.next().unwrap_or(Value::Nil);
            let fields: HashMap<String, i64> = parse_reply(next())?;
            let devices: HashMap<String, u64> = parse_reply(next())?;
            let referrers: HashMap<String, u64> = parse_reply(next())?;
            let projects: HashMap<String, u64> = parse_reply(next())?;
            let visitors: HashSet<String> = parse_reply(next())?;

            if fields.is_empty() {
                continue;
            }

            let field = |name: &str| -> AnalyticsResult<i64> {
                fields.get(name).copied().ok_or_else(|| {
                    AnalyticsError::Store(format!("record {record_key} is missing '{name}'"))
                })
            };

            let id = AggregateId(field("id")?.max(0) as u64);
            let day = DayKey::from_days_since_epoch(field("day")? as i32);
            let key = AggregateKey::new(profile_id.clone(), day);

            let mut record = DailyAggregate::new(
                id,
                &key,
                Counters::views(field("views")?.max(0) as u64)
                    .with_duration(field("total_duration")?.max(0) as u64),
            );
            record.device_stats = devices;
            record.referrer_stats = referrers;
            record.project_interactions = projects;
            record.unique_visitors = visitors
                .into_iter()
                .map(VisitorFingerprint::from_token)
                .collect();
            rows.push(record);
        }
        Ok(rows)
    }
}

/// Commands queued per record by `load_many`.
const READS_PER_RECORD: usize = 5;

fn parse_reply<T: FromRedisValue>(value: Value) -> AnalyticsResult<T> {
    redis::from_redis_value(value).map_err(|e| AnalyticsError::Redis(e.into()))
}

fn histogram_key(record_key: &str, field: HistogramField) -> String {
    let suffix = match field {
        HistogramField::DeviceStats => "device",
        HistogramField::ReferrerStats => "referrer",
        HistogramField::ProjectInteractions => "project",
    };
    format!("{record_key}:{suffix}")
}

fn visitors_key(record_key: &str) -> String {
    format!("{record_key}:visitors")
}

#[async_trait]
impl AggregateStore for RedisAggregateStore {
    async fn upsert_baseline(
        &self,
        key: &AggregateKey,
        seed: Counters,
        increment: Counters,
    ) -> AnalyticsResult<DailyAggregate> {
        let record_key = self.record_key(key);
        let mut conn = self.connection.clone();

        let _id: u64 = self
            .upsert
            .key(&record_key)
            .key(self.config.build_key("next_id"))
            .key(self.config.build_key("ids"))
            .key(self.days_key(&key.profile_id))
            .arg(seed.views)
            .arg(seed.total_duration)
            .arg(increment.views)
            .arg(increment.total_duration)
            .arg(key.day.days_since_epoch())
            .invoke_async(&mut conn)
            .await?;

        self.load(&key.profile_id, &record_key)
            .await?
            .ok_or_else(|| AnalyticsError::Store(format!("record {record_key} vanished after upsert")))
    }

    async fn find(&self, key: &AggregateKey) -> AnalyticsResult<Option<DailyAggregate>> {
        self.load(&key.profile_id, &self.record_key(key)).await
    }

    async fn apply_histogram_delta(
        &self,
        id: AggregateId,
        field: HistogramField,
        key: &str,
        increment: u64,
    ) -> AnalyticsResult<()> {
        let record_key = self.record_key_for(id).await?;
        let mut conn = self.connection.clone();
        let _: i64 = conn
            .hincr(histogram_key(&record_key, field), key, increment)
            .await?;
        Ok(())
    }

    async fn insert_visitor(
        &self,
        id: AggregateId,
        fingerprint: &VisitorFingerprint,
    ) -> AnalyticsResult<bool> {
        let record_key = self.record_key_for(id).await?;
        let mut conn = self.connection.clone();
        let added: u64 = conn
            .sadd(visitors_key(&record_key), fingerprint.as_str())
            .await?;
        Ok(added > 0)
    }

    async fn query(
        &self,
        profile_id: &ProfileId,
        range: DayRange,
    ) -> AnalyticsResult<Vec<DailyAggregate>> {
        let mut conn = self.connection.clone();
        let record_keys: Vec<String> = conn
            .zrangebyscore(
                self.days_key(profile_id),
                range.start.days_since_epoch(),
                range.end.days_since_epoch(),
            )
            .await?;

        let mut rows = self.load_many(profile_id, &record_keys).await?;
        rows.sort_by_key(|record| record.day);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_key() {
        let config = RedisStoreConfig::new("redis://localhost:6379").with_key_prefix("test");
        assert_eq!(config.build_key("ids"), "test:ids");

        let bare = RedisStoreConfig::new("redis://localhost:6379").with_key_prefix("");
        assert_eq!(bare.build_key("ids"), "ids");
    }

    #[test]
    fn test_derived_keys() {
        assert_eq!(
            histogram_key("p:agg:a:1", HistogramField::ReferrerStats),
            "p:agg:a:1:referrer"
        );
        assert_eq!(visitors_key("p:agg:a:1"), "p:agg:a:1:visitors");
    }

    #[test]
    fn test_parse_reply() {
        let fields = Value::Array(vec![
            Value::BulkString(b"views".to_vec()),
            Value::BulkString(b"3".to_vec()),
        ]);
        let parsed: HashMap<String, i64> = parse_reply(fields).unwrap();
        assert_eq!(parsed.get("views"), Some(&3));

        let empty: HashSet<String> = parse_reply(Value::Array(Vec::new())).unwrap();
        assert!(empty.is_empty());

        let bad = Value::Array(vec![
            Value::BulkString(b"views".to_vec()),
            Value::BulkString(b"many".to_vec()),
        ]);
        let result: AnalyticsResult<HashMap<String, i64>> = parse_reply(bad);
        assert!(matches!(result, Err(AnalyticsError::Redis(_))));
    }

    #[tokio::test]
    #[ignore = "requires a running Redis server"]
    async fn test_query_reads_many_days() {
        let config = RedisStoreConfig::new("redis://localhost:6379")
            .with_key_prefix(format!("folio-test-many-{}", std::process::id()));
        let store = RedisAggregateStore::new(config).await.unwrap();
        let profile = ProfileId::from("p-many");

        for offset in [0, 2, 5] {
            let key = AggregateKey::new(
                profile.clone(),
                DayKey::from_days_since_epoch(20_000 + offset),
            );
            store
                .upsert_baseline(&key, Counters::views(1), Counters::views(1))
                .await
                .unwrap();
        }

        let rows = store
            .query(
                &profile,
                DayRange::ending_at(DayKey::from_days_since_epoch(20_005), 6),
            )
            .await
            .unwrap();
        let days: Vec<i32> = rows.iter().map(|r| r.day.days_since_epoch()).collect();
        assert_eq!(days, vec![20_000, 20_002, 20_005]);
    }

    #[tokio::test]
    #[ignore = "requires a running Redis server"]
    async fn test_upsert_and_query_roundtrip() {
        let config = RedisStoreConfig::new("redis://localhost:6379")
            .with_key_prefix(format!("folio-test-{}", std::process::id()));
        let store = RedisAggregateStore::new(config).await.unwrap();
        let key = AggregateKey::new(ProfileId::from("p1"), DayKey::from_days_since_epoch(20_000));

        let first = store
            .upsert_baseline(&key, Counters::views(1), Counters::views(1))
            .await
            .unwrap();
        let second = store
            .upsert_baseline(&key, Counters::views(1), Counters::views(1))
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.views, 2);

        let fp = VisitorFingerprint::from_token("abc");
        assert!(store.insert_visitor(first.id, &fp).await.unwrap());
        assert!(!store.insert_visitor(first.id, &fp).await.unwrap());

        store
            .apply_histogram_delta(first.id, HistogramField::DeviceStats, "mobile", 1)
            .await
            .unwrap();

        let rows = store
            .query(&ProfileId::from("p1"), DayRange::ending_at(key.day, 7))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].count(HistogramField::DeviceStats, "mobile"), 1);
        assert_eq!(rows[0].unique_visitors.len(), 1);
    }
}
