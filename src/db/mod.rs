pub mod migrations;
pub mod models;

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// File name of the SQLite database inside the data directory.
pub const DB_FILE_NAME: &str = "filecast.db";

/// Single shared connection. Queries lock it inside `spawn_blocking`.
pub type DbPool = Arc<Mutex<Connection>>;

/// Open `{data_dir}/filecast.db`, creating both if absent, and bring the
/// schema up to date.
pub fn init_db(data_dir: &str) -> Result<DbPool, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(data_dir)?;

    let db_path = Path::new(data_dir).join(DB_FILE_NAME);
    let mut conn = Connection::open(&db_path)?;

    conn.pragma_update(None, "journal_mode", "WAL")?;

    migrations::migrations().to_latest(&mut conn)?;

    tracing::info!(path = %db_path.display(), "Database ready");

    Ok(Arc::new(Mutex::new(conn)))
}
