use crate::env::{env_or, parse_env, parse_value};
use crate::error::{Result, UniqueError};
use crate::storage::{DEFAULT_NAMESPACE, MembershipStore};
use derive_builder::Builder;
use redis::{Client, Connection};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

/// Connection parameters for the Redis backed store
#[derive(Builder, Clone, Debug)]
#[builder(pattern = "owned")]
pub struct RedisConfig {
    #[builder(default = "\"127.0.0.1\".to_string()")]
    pub host: String,
    #[builder(default = "6379")]
    pub port: u16,
    #[builder(default = "DEFAULT_NAMESPACE.to_string()")]
    pub namespace: String,
    /// Read and write timeout applied to the connection, none by default
    #[builder(default = "None")]
    pub timeout: Option<Duration>,
}

impl RedisConfig {
    /// Reads `UNIQUE_REDIS_HOST`, `UNIQUE_REDIS_PORT`, `UNIQUE_REDIS_NS`
    /// and `UNIQUE_REDIS_TIMEOUT_SECS`, loading `.env` first if present.
    /// Empty values fall back to the defaults.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let host = env_or("UNIQUE_REDIS_HOST", "127.0.0.1");
        let port = parse_env("UNIQUE_REDIS_PORT", "6379")?;
        let namespace = env_or("UNIQUE_REDIS_NS", DEFAULT_NAMESPACE);
        let timeout = match std::env::var("UNIQUE_REDIS_TIMEOUT_SECS") {
            Ok(v) if !v.trim().is_empty() => Some(Duration::from_secs(
                parse_value("UNIQUE_REDIS_TIMEOUT_SECS", &v)?,
            )),
            _ => None,
        };

        Ok(Self {
            host,
            port,
            namespace,
            timeout,
        })
    }

    pub fn url(&self) -> String {
        format!("redis://{}:{}/", self.host, self.port)
    }
}

/// Sorted-set store on a single Redis connection.
///
/// Every trait method maps onto exactly one Redis command, so atomicity is
/// whatever that command guarantees.
pub struct RedisStore {
    conn: Mutex<Connection>,
    namespace: String,
}

impl RedisStore {
    pub fn new(config: &RedisConfig) -> Result<Self> {
        Self::open(&config.url(), &config.namespace, config.timeout)
    }

    pub fn open(
        redis_url: &str,
        namespace: &str,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let client = Client::open(redis_url).map_err(|e| {
            UniqueError::Storage(format!("Redis connection error: {e}"))
        })?;

        let conn = client.get_connection().map_err(|e| {
            UniqueError::Storage(format!("Redis connection error: {e}"))
        })?;

        if timeout.is_some() {
            conn.set_read_timeout(timeout)?;
            conn.set_write_timeout(timeout)?;
        }

        debug!(url = redis_url, namespace, "Connected to redis");
        Ok(Self {
            conn: Mutex::new(conn),
            namespace: namespace.to_string(),
        })
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }

    fn query<T: redis::FromRedisValue>(&self, cmd: &redis::Cmd) -> Result<T> {
        let mut conn = self.conn.lock().map_err(|e| {
            UniqueError::Storage(format!("Redis lock error: {e}"))
        })?;
        Ok(cmd.query(&mut *conn)?)
    }
}

impl MembershipStore for RedisStore {
    fn add_if_absent(&self, key: &str, score: i64, member: &str) -> Result<bool> {
        let added: i64 = self.query(
            redis::cmd("ZADD")
                .arg(self.namespaced(key))
                .arg("NX")
                .arg(score)
                .arg(member),
        )?;
        Ok(added > 0)
    }

    fn count_in_range(&self, key: &str, min: i64, max: i64) -> Result<usize> {
        self.query(
            redis::cmd("ZCOUNT")
                .arg(self.namespaced(key))
                .arg(min)
                .arg(max),
        )
    }

    fn range_by_rank(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<String>> {
        self.query(
            redis::cmd("ZRANGE")
                .arg(self.namespaced(key))
                .arg(start)
                .arg(stop),
        )
    }

    fn remove(&self, key: &str, members: &[String]) -> Result<usize> {
        if members.is_empty() {
            return Ok(0);
        }
        self.query(redis::cmd("ZREM").arg(self.namespaced(key)).arg(members))
    }

    fn delete_key(&self, key: &str) -> Result<()> {
        let _: i64 = self.query(redis::cmd("DEL").arg(self.namespaced(key)))?;
        Ok(())
    }

    fn next_sequence(&self, key: &str) -> Result<i64> {
        self.query(redis::cmd("INCR").arg(self.namespaced(key)))
    }
}
