use httpd::db::open_mysql_pool;
use httpd::prelude::*;

/// Construction-time parameters. Reading these from a file/environment is
/// out of scope (SPEC_FULL.md §1); a real deployment would build this
/// struct from whatever configuration surface it owns and hand it here.
fn load_config() -> ServerConfig {
    ServerConfig {
        listen_port: 1316,
        trigger_mode: 3,
        idle_timeout_ms: 60_000,
        linger_on_close: false,
        root_dir: PathBuf::from("resources"),
        db_host: "localhost".into(),
        db_port: 3306,
        db_user: "root".into(),
        db_pwd: "root".into(),
        db_name: "webserver".into(),
        db_pool_size: 8,
        worker_count: 8,
        log_enabled: true,
        log_level: 1,
        log_queue_size: 1024,
    }
}

fn main() -> Result<()> {
    let config = load_config();
    proxy_log::init(
        config.log_enabled,
        level_from(config.log_level),
        config.log_queue_size,
    );

    let db = match open_mysql_pool(
        &config.db_host,
        config.db_port,
        &config.db_user,
        &config.db_pwd,
        &config.db_name,
        config.db_pool_size,
    ) {
        Ok(pool) => Some(pool),
        Err(e) => {
            errors!("failed to open DB pool, auth routes will verification-fail: {e}");
            None
        }
    };

    info!("starting server on port {}", config.listen_port);
    let mut server = Server::new(config, db)?;
    server.run()
}

fn level_from(log_level: u8) -> proxy_log::Level {
    match log_level {
        0 => proxy_log::Level::Debug,
        1 => proxy_log::Level::Info,
        2 => proxy_log::Level::Warn,
        _ => proxy_log::Level::Error,
    }
}
