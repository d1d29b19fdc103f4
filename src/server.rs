use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender, channel};

use socket2::{Domain, Socket, Type};

use crate::http::connection::WriteProgress;
use crate::prelude::*;
use crate::timer::TimerHeap;
use crate::worker_pool::WorkerPool;

const WAKE_TOKEN: Token = Token(0);
const LISTENER_TOKEN: Token = Token(1);
const FIRST_CONN_TOKEN: usize = 2;
const MAX_FD: usize = 65536;

enum TaskOutcome {
    Close,
    Rearm(Interest),
}

struct CompletedTask {
    token: Token,
    connection: Connection,
    outcome: TaskOutcome,
}

/// Owns the multiplexer, the connection map, the timer heap, the worker
/// pool and the DB pool — the reactor in SPEC_FULL.md's terms (C5/C9).
/// Direct translation of the original project's `WebServer`: the
/// constructor's field list, `InitEventMode_`'s trigger-mode bits and
/// `Start()`'s timer-driven poll loop all carry over; the hand-rolled
/// epoll wrapper does not, since mio supplies that directly.
pub struct Server {
    poll: Poll,
    listener: TcpListener,
    waker: Arc<Waker>,
    connections: HashMap<Token, Connection>,
    next_token: usize,
    timer: TimerHeap,
    expired: Rc<RefCell<Vec<Token>>>,
    pool: WorkerPool,
    db: Option<Arc<MysqlPool>>,
    config: Arc<ServerConfig>,
    completed_tx: Sender<CompletedTask>,
    completed_rx: Receiver<CompletedTask>,
    closing: Arc<AtomicBool>,
}

impl Server {
    pub fn new(config: ServerConfig, db: Option<MysqlPool>) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);

        let addr: SocketAddr = format!("0.0.0.0:{}", config.listen_port).parse()?;
        let socket = Socket::new(Domain::IPV4, Type::STREAM, None)?;
        socket.set_reuse_address(true)?;
        socket.set_linger(if config.linger_on_close {
            Some(Duration::from_secs(1))
        } else {
            None
        })?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        socket.listen(1024)?;
        let mut listener = TcpListener::from_std(socket.into());

        let poll = Poll::new()?;
        poll.registry().register(
            &mut listener,
            LISTENER_TOKEN,
            Interest::READABLE,
        )?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKE_TOKEN)?);

        let (completed_tx, completed_rx) = channel();

        Ok(Self {
            poll,
            listener,
            waker,
            connections: HashMap::new(),
            next_token: FIRST_CONN_TOKEN,
            timer: TimerHeap::new(),
            expired: Rc::new(RefCell::new(Vec::new())),
            pool: WorkerPool::new(config.worker_count),
            db: db.map(Arc::new),
            config,
            completed_tx,
            completed_rx,
            closing: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Main event loop. Blocks until `shutdown()` is called from another
    /// thread (or the process is killed).
    pub fn run(&mut self) -> Result<()> {
        let mut events = Events::with_capacity(1024);

        while !self.closing.load(Ordering::SeqCst) {
            let timeout_ms = self.timer.next_tick_ms();
            self.close_expired();

            let timeout = timeout_ms.map(Duration::from_millis);
            self.poll.poll(&mut events, timeout)?;

            for event in events.iter() {
                let token = event.token();
                if token == WAKE_TOKEN {
                    continue;
                }
                if token == LISTENER_TOKEN {
                    self.accept_loop()?;
                    continue;
                }
                if event.is_error() || (event.is_read_closed() && event.is_write_closed()) {
                    self.remove_connection(token);
                    continue;
                }
                if event.is_readable() {
                    self.dispatch_read(token);
                } else if event.is_writable() {
                    self.dispatch_write(token);
                }
            }

            self.drain_completed();
        }

        self.shutdown_internal();
        Ok(())
    }

    fn close_expired(&mut self) {
        let tokens: Vec<Token> = self.expired.borrow_mut().drain(..).collect();
        for token in tokens {
            info!("connection {:?} idle timeout", token);
            self.remove_connection(token);
        }
    }

    /// Accepts until the listener reports `WouldBlock`; required to drain
    /// fully under edge-triggered mode. Registers each fresh connection
    /// for `READABLE` and starts its idle timer.
    fn accept_loop(&mut self) -> io::Result<()> {
        loop {
            match self.listener.accept() {
                Ok((mut stream, addr)) => {
                    if self.connections.len() >= MAX_FD {
                        let _ = stream.write_all(
                            b"HTTP/1.1 503 Service Unavailable\r\nConnection: close\r\n\r\n",
                        );
                        continue;
                    }
                    let token = Token(self.next_token);
                    self.next_token += 1;

                    self.poll
                        .registry()
                        .register(&mut stream, token, Interest::READABLE)?;

                    let conn = Connection::new(stream, token, addr);
                    self.connections.insert(token, conn);
                    self.start_idle_timer(token);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn start_idle_timer(&mut self, token: Token) {
        let expired = Rc::clone(&self.expired);
        self.timer.add(
            token,
            Duration::from_millis(self.config.idle_timeout_ms),
            Box::new(move |id| expired.borrow_mut().push(id)),
        );
    }

    fn touch(&mut self, token: Token) {
        self.timer
            .adjust(token, Duration::from_millis(self.config.idle_timeout_ms));
    }

    /// Hands a connection off to the worker pool for a read-task. The
    /// connection is removed from the map for the duration of the task so
    /// only one worker ever touches it at a time (the Rust expression of
    /// the one-shot-rearm "one task in flight per fd" invariant).
    fn dispatch_read(&mut self, token: Token) {
        self.touch(token);
        let Some(connection) = self.connections.remove(&token) else {
            return;
        };
        self.spawn_task(token, connection, Phase::Read);
    }

    fn dispatch_write(&mut self, token: Token) {
        self.touch(token);
        let Some(connection) = self.connections.remove(&token) else {
            return;
        };
        self.spawn_task(token, connection, Phase::Write);
    }

    fn spawn_task(&mut self, token: Token, mut connection: Connection, phase: Phase) {
        let root = self.config.root_dir.clone();
        let db = self.db.clone();
        let edge_triggered = self.config.conn_fd_edge_triggered();
        let tx = self.completed_tx.clone();
        let waker = Arc::clone(&self.waker);

        self.pool.submit(move || {
            let outcome = match phase {
                Phase::Read => run_read_phase(&mut connection, &root, db.as_deref(), edge_triggered),
                Phase::Write => run_write_phase(&mut connection, &root, db.as_deref()),
            };
            let _ = tx.send(CompletedTask {
                token,
                connection,
                outcome,
            });
            let _ = waker.wake();
        });
    }

    /// Reinserts every connection a worker finished with, reregistering
    /// its interest (or closing it) based on the outcome it reported.
    fn drain_completed(&mut self) {
        while let Ok(task) = self.completed_rx.try_recv() {
            let CompletedTask {
                token,
                mut connection,
                outcome,
            } = task;
            match outcome {
                TaskOutcome::Close => {
                    self.forget_connection(token, connection);
                }
                TaskOutcome::Rearm(interest) => {
                    if let Err(_) = self
                        .poll
                        .registry()
                        .reregister(&mut connection.stream, token, interest)
                    {
                        self.forget_connection(token, connection);
                        continue;
                    }
                    self.connections.insert(token, connection);
                }
            }
        }
    }

    fn forget_connection(&mut self, token: Token, mut connection: Connection) {
        connection.close();
        let _ = self.poll.registry().deregister(&mut connection.stream);
        self.timer.do_work(token);
    }

    fn remove_connection(&mut self, token: Token) {
        if let Some(connection) = self.connections.remove(&token) {
            self.forget_connection(token, connection);
        } else {
            self.timer.do_work(token);
        }
    }

    /// Requests an orderly shutdown from any thread: sets the closing flag
    /// and wakes the reactor out of `poll.poll` so it observes it promptly.
    pub fn shutdown(&self) {
        self.closing.store(true, Ordering::SeqCst);
        let _ = self.waker.wake();
    }

    /// A cloneable handle that can request shutdown from another thread
    /// without borrowing the `Server` itself (e.g. a signal handler or a
    /// test harness running the reactor on its own thread).
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            closing: Arc::clone(&self.closing),
            waker: Arc::clone(&self.waker),
        }
    }

    fn shutdown_internal(&mut self) {
        let tokens: Vec<Token> = self.connections.keys().copied().collect();
        for token in tokens {
            self.remove_connection(token);
        }
        self.pool.shutdown();
        if let Some(db) = &self.db {
            db.close();
        }
    }
}

/// Cloneable, `Send`-able shutdown trigger decoupled from `&Server`'s
/// borrow — lets a caller hold the `Server` on one thread (running `run()`)
/// while another thread (or a test) requests shutdown.
#[derive(Clone)]
pub struct ShutdownHandle {
    closing: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.closing.store(true, Ordering::SeqCst);
        let _ = self.waker.wake();
    }
}

enum Phase {
    Read,
    Write,
}

fn run_read_phase(
    connection: &mut Connection,
    root: &Path,
    db: Option<&MysqlPool>,
    edge_triggered: bool,
) -> TaskOutcome {
    loop {
        match connection.read() {
            Ok(0) => return TaskOutcome::Close,
            Ok(_) => {
                if !edge_triggered {
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(_) => return TaskOutcome::Close,
        }
    }

    match connection.process(root, db) {
        Ok(true) => TaskOutcome::Rearm(Interest::WRITABLE),
        Ok(false) => TaskOutcome::Rearm(Interest::READABLE),
        Err(_) => TaskOutcome::Close,
    }
}

fn run_write_phase(
    connection: &mut Connection,
    root: &Path,
    db: Option<&MysqlPool>,
) -> TaskOutcome {
    match connection.write() {
        Ok(WriteProgress::Pending) => TaskOutcome::Rearm(Interest::WRITABLE),
        Ok(WriteProgress::Complete) => {
            if !connection.response.keep_alive {
                return TaskOutcome::Close;
            }
            connection.reset_for_next_request();
            if connection.has_pipelined_request() {
                match connection.process(root, db) {
                    Ok(true) => TaskOutcome::Rearm(Interest::WRITABLE),
                    Ok(false) => TaskOutcome::Rearm(Interest::READABLE),
                    Err(_) => TaskOutcome::Close,
                }
            } else {
                TaskOutcome::Rearm(Interest::READABLE)
            }
        }
        Err(_) => TaskOutcome::Close,
    }
}
