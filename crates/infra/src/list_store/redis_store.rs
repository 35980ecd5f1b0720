//! Redis-backed list store.
//!
//! Maps the list primitives onto Redis list commands:
//!
//! - `push` → `LPUSH`
//! - `move_tail_to_head` → `BRPOPLPUSH` (or `RPOPLPUSH` on the command
//!   connection for a zero timeout)
//! - `remove_and_push` → a Lua script running `LREM` + `LPUSH` server-side
//! - `delete` → `MULTI LLEN DEL EXEC`
//!
//! Two long-lived connections are kept: one for short commands and one for
//! blocking pops, so a consumer parked in `BRPOPLPUSH` never delays producers
//! sharing the same store. A connection that fails with an I/O-class error is
//! dropped and re-opened on the next call.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, instrument, warn};

use super::{ListStore, ListStoreError};

const REMOVE_AND_PUSH_SCRIPT: &str = r#"
if redis.call('LREM', KEYS[1], 1, ARGV[1]) == 1 then
  redis.call('LPUSH', KEYS[2], ARGV[2])
  return 1
end
return 0
"#;

/// Longest single `BRPOPLPUSH`; Redis rejects timeouts near `i64::MAX` ms.
/// An idle pop that returns at the cap is just an empty poll.
const MAX_BLOCK: Duration = Duration::from_secs(24 * 60 * 60);

pub struct RedisListStore {
    client: redis::Client,
    conn: Mutex<Option<redis::Connection>>,
    blocking_conn: Mutex<Option<redis::Connection>>,
    remove_and_push: redis::Script,
}

impl std::fmt::Debug for RedisListStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisListStore")
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}

impl RedisListStore {
    /// Create a store for the given Redis URL (e.g. `redis://localhost:6379`).
    ///
    /// Only the URL is validated here; connections are opened lazily.
    pub fn new(redis_url: impl AsRef<str>) -> Result<Self, ListStoreError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| ListStoreError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            conn: Mutex::new(None),
            blocking_conn: Mutex::new(None),
            remove_and_push: redis::Script::new(REMOVE_AND_PUSH_SCRIPT),
        })
    }

    fn with_conn<T>(
        &self,
        slot: &Mutex<Option<redis::Connection>>,
        op: impl FnOnce(&mut redis::Connection) -> redis::RedisResult<T>,
    ) -> Result<T, ListStoreError> {
        let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);

        if guard.is_none() {
            let conn = self
                .client
                .get_connection()
                .map_err(|e| ListStoreError::Connection(e.to_string()))?;
            debug!("opened redis connection");
            *guard = Some(conn);
        }

        let Some(conn) = guard.as_mut() else {
            return Err(ListStoreError::Connection("no connection".to_string()));
        };

        op(conn).map_err(|e| {
            if is_connection_error(&e) {
                warn!(error = %e, "dropping redis connection");
                *guard = None;
                ListStoreError::Connection(e.to_string())
            } else {
                ListStoreError::Command(e.to_string())
            }
        })
    }
}

fn is_connection_error(e: &redis::RedisError) -> bool {
    e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout()
}

impl ListStore for RedisListStore {
    fn push(&self, key: &str, value: &str) -> Result<(), ListStoreError> {
        self.with_conn(&self.conn, |conn| {
            redis::cmd("LPUSH").arg(key).arg(value).query::<i64>(conn)
        })?;
        Ok(())
    }

    #[instrument(skip(self), level = "trace", err)]
    fn move_tail_to_head(
        &self,
        src: &str,
        dst: &str,
        timeout: Duration,
    ) -> Result<Option<String>, ListStoreError> {
        // A zero timeout never parks, so it must not queue behind a consumer
        // holding the blocking connection.
        if timeout.is_zero() {
            return self.with_conn(&self.conn, |conn| {
                redis::cmd("RPOPLPUSH").arg(src).arg(dst).query(conn)
            });
        }

        self.with_conn(&self.blocking_conn, |conn| {
            // Fractional timeouts need Redis >= 6; zero would block forever.
            redis::cmd("BRPOPLPUSH")
                .arg(src)
                .arg(dst)
                .arg(timeout.min(MAX_BLOCK).as_secs_f64())
                .query(conn)
        })
    }

    fn remove_and_push(
        &self,
        src: &str,
        value: &str,
        dst: &str,
        replacement: &str,
    ) -> Result<bool, ListStoreError> {
        let removed: i64 = self.with_conn(&self.conn, |conn| {
            self.remove_and_push
                .key(src)
                .key(dst)
                .arg(value)
                .arg(replacement)
                .invoke(conn)
        })?;
        Ok(removed == 1)
    }

    fn len(&self, key: &str) -> Result<usize, ListStoreError> {
        self.with_conn(&self.conn, |conn| redis::cmd("LLEN").arg(key).query(conn))
    }

    fn range(&self, key: &str, limit: Option<usize>) -> Result<Vec<String>, ListStoreError> {
        let stop: i64 = match limit {
            Some(0) => return Ok(Vec::new()),
            Some(n) => i64::try_from(n).map_or(-1, |n| n - 1),
            None => -1,
        };

        self.with_conn(&self.conn, |conn| {
            redis::cmd("LRANGE").arg(key).arg(0).arg(stop).query(conn)
        })
    }

    fn delete(&self, key: &str) -> Result<usize, ListStoreError> {
        let (len,): (usize,) = self.with_conn(&self.conn, |conn| {
            redis::pipe()
                .atomic()
                .cmd("LLEN")
                .arg(key)
                .cmd("DEL")
                .arg(key)
                .ignore()
                .query(conn)
        })?;
        Ok(len)
    }

    fn ping(&self) -> Result<(), ListStoreError> {
        let reply: String = self.with_conn(&self.conn, |conn| redis::cmd("PING").query(conn))?;
        if reply == "PONG" {
            Ok(())
        } else {
            Err(ListStoreError::Command(format!("unexpected PING reply: {reply}")))
        }
    }
}
