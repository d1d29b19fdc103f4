pub use crate::buffer::Buffer;
pub use crate::config::ServerConfig;
pub use crate::db::MysqlPool;
pub use crate::error::{Result, ServerError};
pub use crate::http::request::Method;
pub use crate::http::response::{STATUS_BAD_REQUEST, STATUS_FORBIDDEN, STATUS_NOT_FOUND, STATUS_OK};
pub use crate::http::{Connection, HttpRequest, HttpResponse};
pub use crate::server::{Server, ShutdownHandle};

pub use mio::{
    Events, Interest, Poll, Token, Waker,
    net::{TcpListener, TcpStream},
};
pub use proxy_log::{debug, errors, info, trace, warn};

pub use std::collections::HashMap;
pub use std::io::{self, Read, Write};
pub use std::net::SocketAddr;
pub use std::path::{Path, PathBuf};
pub use std::sync::Arc;
pub use std::time::{Duration, Instant};
