use std::path::PathBuf;

use crate::error::{Result, ServerError};

/// Construction-time server parameters. Built directly by the embedding
/// binary (or a test harness) — reading these from a file, the environment
/// or a CLI grammar is out of scope (see SPEC_FULL.md §1, §10.2).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_port: u16,
    /// bit 0: connection fds edge-triggered; bit 1: listen fd edge-triggered.
    pub trigger_mode: u8,
    pub idle_timeout_ms: u64,
    pub linger_on_close: bool,
    pub root_dir: PathBuf,

    pub db_host: String,
    pub db_port: u16,
    pub db_user: String,
    pub db_pwd: String,
    pub db_name: String,
    pub db_pool_size: usize,

    pub worker_count: usize,

    pub log_enabled: bool,
    pub log_level: u8,
    pub log_queue_size: usize,
}

impl ServerConfig {
    pub fn listen_fd_edge_triggered(&self) -> bool {
        self.trigger_mode & 0b10 != 0
    }

    pub fn conn_fd_edge_triggered(&self) -> bool {
        self.trigger_mode & 0b01 != 0
    }

    /// Checks every bound named in SPEC_FULL.md §6. Called once at startup,
    /// before any socket or pool is created; an out-of-range value is a
    /// startup-abort error, never a panic.
    pub fn validate(&self) -> Result<()> {
        if self.listen_port < 1024 {
            return Err(ServerError::from(format!(
                "listen_port {} must be >= 1024",
                self.listen_port
            )));
        }
        if self.trigger_mode > 0b11 {
            return Err(ServerError::from(format!(
                "trigger_mode {} out of range 0..=3",
                self.trigger_mode
            )));
        }
        if self.log_level > 3 {
            return Err(ServerError::from(format!(
                "log_level {} out of range 0..=3",
                self.log_level
            )));
        }
        if self.db_pool_size == 0 {
            return Err(ServerError::from("db_pool_size must be non-zero"));
        }
        if self.worker_count == 0 {
            return Err(ServerError::from("worker_count must be non-zero"));
        }
        if self.log_queue_size == 0 {
            return Err(ServerError::from("log_queue_size must be non-zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> ServerConfig {
        ServerConfig {
            listen_port: 8080,
            trigger_mode: 3,
            idle_timeout_ms: 60_000,
            linger_on_close: false,
            root_dir: PathBuf::from("resources"),
            db_host: "127.0.0.1".into(),
            db_port: 3306,
            db_user: "root".into(),
            db_pwd: "root".into(),
            db_name: "webserver".into(),
            db_pool_size: 4,
            worker_count: 4,
            log_enabled: true,
            log_level: 1,
            log_queue_size: 1024,
        }
    }

    #[test]
    fn accepts_valid_config() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn rejects_low_port() {
        let mut cfg = valid_config();
        cfg.listen_port = 80;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_bad_trigger_mode() {
        let mut cfg = valid_config();
        cfg.trigger_mode = 4;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_zero_worker_count() {
        let mut cfg = valid_config();
        cfg.worker_count = 0;
        assert!(cfg.validate().is_err());
    }
}
