//! Bounded pool of SQLite sessions with scoped transactional acquisition.
#![forbid(unsafe_code)]

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8};
use rusqlite::{Connection, Error as SqliteError, Transaction};
use thiserror::Error;

use super::schema::{SchemaError, initialise_schema};

const DEFAULT_MIN_SESSIONS: usize = 1;
const DEFAULT_MAX_SESSIONS: usize = 3;
const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Sizing and timeout policy for a [`SessionPool`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Path of the SQLite database file.
    pub database: Utf8PathBuf,
    /// Connections opened eagerly.
    pub min_sessions: usize,
    /// Upper bound on open connections.
    pub max_sessions: usize,
    /// How long [`SessionPool::acquire`] waits before giving up.
    pub acquire_timeout: Duration,
    /// How long SQLite retries a locked database before failing a statement.
    pub busy_timeout: Duration,
}

impl PoolConfig {
    /// Default policy for `database`.
    #[must_use]
    pub fn new(database: impl Into<Utf8PathBuf>) -> Self {
        Self {
            database: database.into(),
            min_sessions: DEFAULT_MIN_SESSIONS,
            max_sessions: DEFAULT_MAX_SESSIONS,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }

    /// Set the minimum and maximum session counts.
    #[must_use]
    pub const fn with_sessions(mut self, min: usize, max: usize) -> Self {
        self.min_sessions = min;
        self.max_sessions = max;
        self
    }

    /// Set the acquisition timeout.
    #[must_use]
    pub const fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Set the SQLite busy timeout.
    #[must_use]
    pub const fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    fn validate(&self) -> Result<(), PoolError> {
        if self.max_sessions == 0 {
            return Err(PoolError::InvalidConfig {
                reason: "max_sessions must be at least 1".to_owned(),
            });
        }
        if self.min_sessions > self.max_sessions {
            return Err(PoolError::InvalidConfig {
                reason: format!(
                    "min_sessions ({}) exceeds max_sessions ({})",
                    self.min_sessions, self.max_sessions
                ),
            });
        }
        if self.acquire_timeout.is_zero() {
            return Err(PoolError::InvalidConfig {
                reason: "acquire_timeout must be positive".to_owned(),
            });
        }
        Ok(())
    }
}

/// Errors raised by the [`SessionPool`].
#[derive(Debug, Error)]
pub enum PoolError {
    /// The configuration is inconsistent.
    #[error("invalid pool configuration: {reason}")]
    InvalidConfig {
        /// What is wrong.
        reason: String,
    },
    /// Failed to create the parent directory for the database.
    #[error("failed to create parent directory {path:?}")]
    CreateDirectory {
        /// Path of the directory that could not be created.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Opening the SQLite database failed.
    #[error("failed to open SQLite database at {path:?}")]
    Open {
        /// Database path.
        path: Utf8PathBuf,
        /// Source error returned by `rusqlite`.
        #[source]
        source: SqliteError,
    },
    /// Applying a connection setting failed.
    #[error("failed to configure SQLite connection: {operation}")]
    Configure {
        /// Setting being applied.
        operation: &'static str,
        /// Source error returned by `rusqlite`.
        #[source]
        source: SqliteError,
    },
    /// Schema initialisation failed.
    #[error(transparent)]
    Schema(#[from] SchemaError),
    /// Beginning or finishing a transaction failed.
    #[error("failed to {operation} transaction")]
    Transaction {
        /// Transaction step.
        operation: &'static str,
        /// Source error returned by `rusqlite`.
        #[source]
        source: SqliteError,
    },
    /// The pool has been closed.
    #[error("session pool is closed")]
    Closed,
    /// No session became free within the acquisition timeout.
    #[error("no database session became available within {timeout:?}")]
    Unavailable {
        /// Configured acquisition timeout.
        timeout: Duration,
    },
}

#[derive(Debug)]
struct PoolState {
    idle: Vec<Connection>,
    open: usize,
    closed: bool,
}

#[derive(Debug)]
struct PoolInner {
    config: PoolConfig,
    state: Mutex<PoolState>,
    available: Condvar,
}

impl PoolInner {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self, connection: Connection) {
        let mut state = self.lock();
        if state.closed || !connection.is_autocommit() {
            // A closed pool drops returning connections, and a connection
            // still inside a transaction cannot be reused safely.
            state.open = state.open.saturating_sub(1);
            drop(state);
            drop(connection);
        } else {
            state.idle.push(connection);
            drop(state);
        }
        self.available.notify_one();
    }

    fn forget_slot(&self) {
        let mut state = self.lock();
        state.open = state.open.saturating_sub(1);
        drop(state);
        self.available.notify_one();
    }
}

/// A bounded pool of SQLite connections.
///
/// The pool is created once by the process entry point, shared by cloning,
/// and torn down with [`SessionPool::close`]. Connections are opened lazily
/// up to `max_sessions`; callers block in [`SessionPool::acquire`] until one
/// is free or the acquisition timeout elapses.
///
/// # Examples
/// ```
/// use stargaze_data::store::{PoolConfig, PoolError, SessionPool};
///
/// let dir = tempfile::tempdir().expect("temp dir");
/// let path = camino::Utf8PathBuf::from_path_buf(dir.path().join("cache.db")).expect("utf-8");
/// let pool = SessionPool::open(PoolConfig::new(path))?;
/// let tiles: i64 = pool.session_scope(|tx| {
///     tx.query_row("SELECT COUNT(*) FROM tiles", [], |row| row.get(0))
///         .map_err(|source| PoolError::Transaction { operation: "count", source })
/// })?;
/// assert_eq!(tiles, 0);
/// pool.close();
/// pool.close();
/// # Ok::<(), PoolError>(())
/// ```
#[derive(Debug, Clone)]
pub struct SessionPool {
    inner: Arc<PoolInner>,
}

impl SessionPool {
    /// Open the database, initialise its schema and warm `min_sessions`
    /// connections.
    pub fn open(config: PoolConfig) -> Result<Self, PoolError> {
        config.validate()?;
        ensure_parent_dir(&config.database)?;

        let mut first = open_connection(&config)?;
        initialise_schema(&mut first)?;
        let mut idle = vec![first];
        while idle.len() < config.min_sessions {
            idle.push(open_connection(&config)?);
        }
        log::debug!(
            "opened session pool for {} with {} warm connection(s)",
            config.database,
            idle.len()
        );

        let open = idle.len();
        Ok(Self {
            inner: Arc::new(PoolInner {
                config,
                state: Mutex::new(PoolState {
                    idle,
                    open,
                    closed: false,
                }),
                available: Condvar::new(),
            }),
        })
    }

    /// Configuration the pool was opened with.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Take a session, waiting up to the acquisition timeout.
    pub fn acquire(&self) -> Result<Session, PoolError> {
        let timeout = self.inner.config.acquire_timeout;
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.lock();
        loop {
            if state.closed {
                return Err(PoolError::Closed);
            }
            if let Some(connection) = state.idle.pop() {
                return Ok(self.session(connection));
            }
            if state.open < self.inner.config.max_sessions {
                state.open += 1;
                drop(state);
                return match open_connection(&self.inner.config) {
                    Ok(connection) => Ok(self.session(connection)),
                    Err(err) => {
                        self.inner.forget_slot();
                        Err(err)
                    }
                };
            }
            let now = Instant::now();
            if now >= deadline {
                log::warn!("session pool exhausted after waiting {timeout:?}");
                return Err(PoolError::Unavailable { timeout });
            }
            let (guard, _) = self
                .inner
                .available
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
    }

    fn session(&self, connection: Connection) -> Session {
        Session {
            connection: Some(connection),
            pool: Arc::clone(&self.inner),
        }
    }

    /// Run `work` inside one transaction on a pooled session.
    ///
    /// The transaction commits when `work` succeeds and rolls back when it
    /// fails or panics. The session returns to the pool on every path.
    pub fn session_scope<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, E>,
        E: From<PoolError>,
    {
        let mut session = self.acquire()?;
        let transaction = session
            .transaction()
            .map_err(|source| PoolError::Transaction {
                operation: "begin",
                source,
            })?;
        match work(&transaction) {
            Ok(value) => {
                transaction
                    .commit()
                    .map_err(|source| PoolError::Transaction {
                        operation: "commit",
                        source,
                    })?;
                Ok(value)
            }
            Err(err) => {
                if let Err(source) = transaction.rollback() {
                    log::warn!("rollback failed: {source}");
                }
                Err(err)
            }
        }
    }

    /// Close every idle connection and refuse further acquisitions.
    ///
    /// Sessions still checked out are closed when they are dropped. Calling
    /// this more than once has no further effect.
    pub fn close(&self) {
        let mut state = self.inner.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        let idle = std::mem::take(&mut state.idle);
        state.open = state.open.saturating_sub(idle.len());
        drop(state);
        self.inner.available.notify_all();
        for connection in idle {
            if let Err((_, err)) = connection.close() {
                log::warn!("failed to close pooled connection: {err}");
            }
        }
        log::debug!("closed session pool for {}", self.inner.config.database);
    }

    /// Report whether [`SessionPool::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Connections currently open, idle or checked out.
    #[must_use]
    pub fn open_sessions(&self) -> usize {
        self.inner.lock().open
    }

    /// Connections waiting in the pool.
    #[must_use]
    pub fn idle_sessions(&self) -> usize {
        self.inner.lock().idle.len()
    }
}

/// A connection checked out of a [`SessionPool`].
///
/// Dereferences to [`Connection`] and returns to the pool on drop.
#[derive(Debug)]
pub struct Session {
    connection: Option<Connection>,
    pool: Arc<PoolInner>,
}

impl Deref for Session {
    type Target = Connection;

    fn deref(&self) -> &Self::Target {
        self.connection
            .as_ref()
            .unwrap_or_else(|| unreachable!("session connection is only taken on drop"))
    }
}

impl DerefMut for Session {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.connection
            .as_mut()
            .unwrap_or_else(|| unreachable!("session connection is only taken on drop"))
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            self.pool.release(connection);
        }
    }
}

fn open_connection(config: &PoolConfig) -> Result<Connection, PoolError> {
    let connection =
        Connection::open(config.database.as_std_path()).map_err(|source| PoolError::Open {
            path: config.database.clone(),
            source,
        })?;
    connection
        .busy_timeout(config.busy_timeout)
        .map_err(|source| PoolError::Configure {
            operation: "busy_timeout",
            source,
        })?;
    connection
        .pragma_update(None, "foreign_keys", true)
        .map_err(|source| PoolError::Configure {
            operation: "foreign_keys",
            source,
        })?;
    connection
        .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
        .map_err(|source| PoolError::Configure {
            operation: "journal_mode",
            source,
        })?;
    Ok(connection)
}

fn ensure_parent_dir(path: &Utf8Path) -> Result<(), PoolError> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() || parent == Utf8Path::new("/") {
        return Ok(());
    }

    let (base, relative) = if parent.is_absolute() {
        ("/", parent.strip_prefix("/").unwrap_or(parent))
    } else {
        (".", parent)
    };
    let create_error = |source| PoolError::CreateDirectory {
        path: parent.to_path_buf(),
        source,
    };
    let dir = fs_utf8::Dir::open_ambient_dir(base, ambient_authority()).map_err(create_error)?;
    dir.create_dir_all(relative).map_err(create_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use std::thread;
    use tempfile::TempDir;

    #[fixture]
    fn temp_dir() -> TempDir {
        TempDir::new().expect("create temp dir")
    }

    fn database(dir: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().join("cache.db")).expect("utf-8 path")
    }

    #[rstest]
    #[case(0, 0)]
    #[case(3, 2)]
    fn rejects_inconsistent_sizes(temp_dir: TempDir, #[case] min: usize, #[case] max: usize) {
        let config = PoolConfig::new(database(&temp_dir)).with_sessions(min, max);
        let err = SessionPool::open(config).expect_err("invalid sizes");
        assert!(matches!(err, PoolError::InvalidConfig { .. }));
    }

    #[rstest]
    fn warms_minimum_sessions(temp_dir: TempDir) {
        let config = PoolConfig::new(database(&temp_dir)).with_sessions(2, 4);
        let pool = SessionPool::open(config).expect("open pool");
        assert_eq!(pool.open_sessions(), 2);
        assert_eq!(pool.idle_sessions(), 2);
    }

    #[rstest]
    fn creates_parent_directory(temp_dir: TempDir) {
        let nested =
            Utf8PathBuf::from_path_buf(temp_dir.path().join("nested/cache.db")).expect("utf-8 path");
        SessionPool::open(PoolConfig::new(nested.clone())).expect("open pool");
        assert!(nested.exists(), "database should be created at nested path");
    }

    #[rstest]
    fn enables_write_ahead_logging(temp_dir: TempDir) {
        let pool = SessionPool::open(PoolConfig::new(database(&temp_dir))).expect("open pool");
        let session = pool.acquire().expect("acquire");
        let mode: String = session
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .expect("read journal mode");
        assert_eq!(mode.to_ascii_lowercase(), "wal");
    }

    #[rstest]
    fn exhaustion_times_out(temp_dir: TempDir) {
        let config = PoolConfig::new(database(&temp_dir))
            .with_sessions(1, 1)
            .with_acquire_timeout(Duration::from_millis(50));
        let pool = SessionPool::open(config).expect("open pool");
        let _held = pool.acquire().expect("first session");

        let err = pool.acquire().expect_err("pool exhausted");

        assert!(matches!(err, PoolError::Unavailable { .. }));
    }

    #[rstest]
    fn released_session_wakes_waiter(temp_dir: TempDir) {
        let config = PoolConfig::new(database(&temp_dir))
            .with_sessions(1, 1)
            .with_acquire_timeout(Duration::from_secs(5));
        let pool = SessionPool::open(config).expect("open pool");
        let held = pool.acquire().expect("first session");

        let waiter = {
            let pool = pool.clone();
            thread::spawn(move || pool.acquire().map(|_| ()))
        };
        thread::sleep(Duration::from_millis(20));
        drop(held);

        waiter
            .join()
            .expect("waiter thread")
            .expect("waiter should get the released session");
    }

    #[rstest]
    fn scope_commits_on_success(temp_dir: TempDir) {
        let pool = SessionPool::open(PoolConfig::new(database(&temp_dir))).expect("open pool");
        pool.session_scope(|tx| {
            tx.execute(
                "INSERT INTO residential_area (ref, shape) VALUES (1, 'POINT (0 0)')",
                [],
            )
            .map_err(|source| PoolError::Transaction {
                operation: "insert",
                source,
            })
        })
        .expect("scope succeeds");

        let count: i64 = pool
            .acquire()
            .expect("acquire")
            .query_row("SELECT COUNT(*) FROM residential_area", [], |row| row.get(0))
            .expect("count");
        assert_eq!(count, 1);
    }

    #[rstest]
    fn scope_rolls_back_on_error(temp_dir: TempDir) {
        let pool = SessionPool::open(PoolConfig::new(database(&temp_dir))).expect("open pool");
        let outcome: Result<(), PoolError> = pool.session_scope(|tx| {
            tx.execute(
                "INSERT INTO residential_area (ref, shape) VALUES (1, 'POINT (0 0)')",
                [],
            )
            .map_err(|source| PoolError::Transaction {
                operation: "insert",
                source,
            })?;
            Err(PoolError::Closed)
        });
        assert!(outcome.is_err());

        let count: i64 = pool
            .acquire()
            .expect("acquire")
            .query_row("SELECT COUNT(*) FROM residential_area", [], |row| row.get(0))
            .expect("count");
        assert_eq!(count, 0);
        assert_eq!(pool.idle_sessions(), 1, "session should return to the pool");
    }

    #[rstest]
    fn close_is_idempotent(temp_dir: TempDir) {
        let pool = SessionPool::open(PoolConfig::new(database(&temp_dir))).expect("open pool");
        pool.close();
        pool.close();

        assert!(pool.is_closed());
        assert_eq!(pool.open_sessions(), 0);
        assert!(matches!(pool.acquire(), Err(PoolError::Closed)));
    }

    #[rstest]
    fn sessions_dropped_after_close_are_discarded(temp_dir: TempDir) {
        let pool = SessionPool::open(PoolConfig::new(database(&temp_dir))).expect("open pool");
        let session = pool.acquire().expect("acquire");
        pool.close();
        drop(session);

        assert_eq!(pool.open_sessions(), 0);
        assert_eq!(pool.idle_sessions(), 0);
    }
}
