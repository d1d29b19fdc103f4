use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, SyncSender, sync_channel};
use std::sync::Mutex;

use mysql::prelude::Queryable;
use mysql::{Conn, Opts, OptsBuilder};

use crate::error::{Result, ServerError};

/// Bounded pool of pre-opened sessions. A `sync_channel` pre-loaded with `n`
/// items doubles as both the FIFO queue and the blocking counting
/// semaphore the original `SqlConnPool` builds from `sem_t` + `mutex` +
/// `queue`: `lease()` is `recv()`, `release()` is `send()`, and the channel
/// itself enforces "at most `n` outstanding" for free. Generic over the
/// session type so the pool's invariants are testable without a live
/// database (see tests below).
pub struct SessionPool<T: Send + 'static> {
    tx: SyncSender<T>,
    rx: Mutex<Receiver<T>>,
    size: usize,
    closed: AtomicBool,
}

/// Returned by `lease()` once the pool has been `close()`d; per
/// SPEC_FULL.md §4.4 a closed pool reports failure without blocking.
#[derive(Debug)]
pub struct PoolClosed;

impl fmt::Display for PoolClosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "db session pool is closed")
    }
}

impl std::error::Error for PoolClosed {}

/// RAII guard returned by `SessionPool::lease`. Returns the session to the
/// pool on every exit path, including panics unwinding through it.
pub struct Lease<'p, T: Send + 'static> {
    session: Option<T>,
    pool: &'p SessionPool<T>,
}

impl<T: Send + 'static> SessionPool<T> {
    /// Builds a pool already filled with `sessions` (its length determines
    /// the pool's capacity/semaphore count).
    pub fn new(sessions: Vec<T>) -> Self {
        let size = sessions.len();
        let (tx, rx) = sync_channel(size.max(1));
        for s in sessions {
            tx.try_send(s).expect("pool initial fill must not exceed capacity");
        }
        Self {
            tx,
            rx: Mutex::new(rx),
            size,
            closed: AtomicBool::new(false),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Blocks until a session is available, then leases it. Fails
    /// immediately, without blocking, if the pool has already been closed.
    pub fn lease(&self) -> Result<Lease<'_, T>> {
        if self.is_closed() {
            return Err(PoolClosed.into());
        }
        let session = self
            .rx
            .lock()
            .unwrap()
            .recv()
            .map_err(|_| PoolClosed)?;
        Ok(Lease {
            session: Some(session),
            pool: self,
        })
    }

    /// Drains every idle session out of the FIFO and drops it (closing the
    /// underlying handle). Sessions still on lease at the time of the call
    /// are dropped by their `Lease` guard, which checks `closed` on return
    /// rather than re-queuing them.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let rx = self.rx.lock().unwrap();
        while let Ok(session) = rx.try_recv() {
            drop(session);
        }
    }

    fn release(&self, session: T) {
        if self.is_closed() {
            drop(session);
            return;
        }
        // A full channel here would mean more sessions are outstanding than
        // were ever issued, which cannot happen as long as every lease is
        // returned exactly once.
        let _ = self.tx.try_send(session);
    }
}

impl<T: Send + 'static> std::ops::Deref for Lease<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        self.session.as_ref().expect("session taken before drop")
    }
}

impl<T: Send + 'static> std::ops::DerefMut for Lease<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.session.as_mut().expect("session taken before drop")
    }
}

impl<T: Send + 'static> Drop for Lease<'_, T> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            self.pool.release(session);
        }
    }
}

/// Concrete session pool over blocking `mysql::Conn`s, used by the
/// authentication path (C10) against the `user(username,password)` table.
pub type MysqlPool = SessionPool<Conn>;

pub fn open_mysql_pool(
    host: &str,
    port: u16,
    user: &str,
    password: &str,
    db_name: &str,
    pool_size: usize,
) -> Result<MysqlPool> {
    let opts: Opts = OptsBuilder::default()
        .ip_or_hostname(Some(host))
        .tcp_port(port)
        .user(Some(user))
        .pass(Some(password))
        .db_name(Some(db_name))
        .into();

    let mut sessions = Vec::with_capacity(pool_size);
    for _ in 0..pool_size {
        sessions.push(Conn::new(opts.clone())?);
    }
    Ok(SessionPool::new(sessions))
}

/// Looks up the stored password for `username`, returning `None` if no row
/// matches. Always goes through a bound parameter, never string
/// interpolation (see SPEC_FULL.md §9 open question resolution).
pub fn lookup_password(conn: &mut Conn, username: &str) -> Result<Option<String>> {
    let row: Option<String> = conn.exec_first(
        "SELECT password FROM user WHERE username = ? LIMIT 1",
        (username,),
    )?;
    Ok(row)
}

/// Inserts a new user row. Fails (returns `Err`) if the username already
/// exists (unique constraint) or on any other driver error.
pub fn insert_user(conn: &mut Conn, username: &str, password: &str) -> Result<()> {
    conn.exec_drop(
        "INSERT INTO user(username, password) VALUES (?, ?)",
        (username, password),
    )?;
    Ok(())
}
