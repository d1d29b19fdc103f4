use std::io::IoSlice;

use crate::prelude::*;

#[derive(Debug, PartialEq, Eq)]
pub enum WriteProgress {
    Complete,
    Pending,
}

/// Per-fd state: read/write buffers, the in-flight request/response, and
/// the cursor into the response's gather-write vector. Owned by the
/// server's connection map; a worker task is handed `&mut Connection` for
/// the duration of exactly one read-task or write-task (see SPEC_FULL.md
/// §5 — one-shot rearm keeps this exclusive without a per-connection
/// lock). Direct translation of the original project's `HttpConn`.
#[derive(Debug)]
pub struct Connection {
    pub stream: TcpStream,
    pub token: Token,
    pub peer_addr: SocketAddr,
    pub read_buf: Buffer,
    pub write_buf: Buffer,
    pub request: HttpRequest,
    pub response: HttpResponse,
    file_sent: usize,
    pub closed: bool,
}

impl Connection {
    pub fn new(stream: TcpStream, token: Token, peer_addr: SocketAddr) -> Self {
        Self {
            stream,
            token,
            peer_addr,
            read_buf: Buffer::new(),
            write_buf: Buffer::new(),
            request: HttpRequest::new(),
            response: HttpResponse::new(),
            file_sent: 0,
            closed: false,
        }
    }

    /// Scatter-reads one burst from the socket into `read_buf`. Returns
    /// `Ok(0)` on EOF, same as a direct `read(2)` would.
    pub fn read(&mut self) -> io::Result<usize> {
        self.read_buf.read_from_fd(&mut self.stream)
    }

    /// Drives the request parser and, once a full request is available,
    /// stages a response into `write_buf`.
    ///
    /// # Logic Steps
    /// 1. Feed `read_buf` to the parser; if incomplete, return `Ok(false)`
    ///    so the caller keeps waiting on readability.
    /// 2. On a successful parse, run the login/register authentication
    ///    branch (C10) if the request targets one of those paths and a DB
    ///    pool was supplied — this may rewrite `request.path`.
    /// 3. Build the response (200 on success, 400 on a malformed request)
    ///    against `root`, mapping the target file into memory.
    /// 4. Reset the gather-write cursor for the new response cycle.
    pub fn process(&mut self, root: &Path, db: Option<&MysqlPool>) -> io::Result<bool> {
        let parsed = self.request.parse(&mut self.read_buf);
        match parsed {
            Ok(true) => {
                if self.request.method == Method::Post {
                    if let Some(pool) = db {
                        crate::auth::authenticate(&mut self.request, pool);
                    }
                }
                let keep_alive = self.request.is_keep_alive();
                self.response
                    .init(root, &self.request.path, keep_alive, STATUS_OK);
                self.response.make_response(&mut self.write_buf)?;
                self.file_sent = 0;
                Ok(true)
            }
            Ok(false) => Ok(false),
            Err(_) => {
                self.response
                    .init(root, &self.request.path, false, STATUS_BAD_REQUEST);
                self.response.make_response(&mut self.write_buf)?;
                self.file_sent = 0;
                Ok(true)
            }
        }
    }

    /// Gather-writes `[header_bytes, mmap_bytes]` to the socket in a
    /// single `writev`-equivalent call, looping until either the whole
    /// response has been sent or the socket reports `WouldBlock`.
    /// Mirrors the original's `HttpConn::write` iovec-advance loop.
    pub fn write(&mut self) -> io::Result<WriteProgress> {
        loop {
            let header = self.write_buf.peek();
            let file_bytes = self.response.file_bytes().unwrap_or(&[]);
            let file_remaining = &file_bytes[self.file_sent.min(file_bytes.len())..];

            if header.is_empty() && file_remaining.is_empty() {
                return Ok(WriteProgress::Complete);
            }

            let slices = [IoSlice::new(header), IoSlice::new(file_remaining)];
            match self.stream.write_vectored(&slices) {
                Ok(0) => {
                    return Err(io::Error::new(io::ErrorKind::WriteZero, "wrote zero bytes"));
                }
                Ok(n) => {
                    let header_len = header.len();
                    if n <= header_len {
                        self.write_buf.retrieve(n);
                    } else {
                        self.write_buf.retrieve(header_len);
                        self.file_sent += n - header_len;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(WriteProgress::Pending),
                Err(e) => return Err(e),
            }
        }
    }

    /// Resets request/response state for the next cycle on a keep-alive
    /// connection (or an immediately pipelined request already buffered).
    pub fn reset_for_next_request(&mut self) {
        self.request.reset();
        self.response = HttpResponse::new();
        self.file_sent = 0;
    }

    pub fn has_pipelined_request(&self) -> bool {
        self.read_buf.readable() > 0
    }

    /// Idempotent close: unmaps any file view and marks the connection
    /// dead. The actual fd is released when the `Connection` (and its
    /// `TcpStream`) is dropped from the server's connection map — this
    /// flag only guards against a timer callback firing twice.
    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.response.unmap();
        }
    }
}
