/*!
 * Shared SQLite handle for the project store.
 *
 * One connection is opened per database and guarded by a mutex; every
 * statement runs on tokio's blocking pool so store calls never stall the
 * async workers.
 */

use anyhow::{Context, Result, anyhow};
use log::info;
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::schema;

/// Handle to an opened, schema-initialized project database. Clones share the connection.
#[derive(Clone)]
pub struct DatabaseConnection {
    location: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl DatabaseConnection {
    /// Open `<local data dir>/sublingo/projects.db`.
    pub fn open_default() -> Result<Self> {
        Self::open(Self::default_path()?)
    }

    /// Open or create a database file, creating missing parent directories.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let location = path.as_ref().to_path_buf();
        if let Some(dir) = location.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).with_context(|| format!("Cannot create {}", dir.display()))?;
        }
        let conn = Connection::open(&location).with_context(|| format!("Cannot open {}", location.display()))?;
        info!("Project database: {}", location.display());
        Self::wrap(conn, location)
    }

    /// Private database that lives as long as the handle.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Cannot open in-memory database")?;
        Self::wrap(conn, PathBuf::from(":memory:"))
    }

    fn wrap(conn: Connection, location: PathBuf) -> Result<Self> {
        schema::initialize_schema(&conn)?;
        Ok(Self {
            location,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn default_path() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .or_else(dirs::data_dir)
            .ok_or_else(|| anyhow!("No data directory for the project database"))?;
        Ok(data_dir.join("sublingo").join("projects.db"))
    }

    pub fn path(&self) -> &Path {
        &self.location
    }

    /// Run `job` with exclusive access to the connection on the blocking pool.
    ///
    /// A job sees no other writer between its first and last statement.
    pub async fn run<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || job(&conn.lock()))
            .await
            .context("Database job did not complete")?
    }
}
