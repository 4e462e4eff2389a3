//! File-backed test databases
//!
//! Each `TestDatabase` gets a unique SQLite file under the system temp dir,
//! created through the crate's own `create_pool` so WAL mode, busy timeout
//! and migrations match production. The file is removed on drop.

use std::path::{Path, PathBuf};

use credvault::storage::{create_pool, DatabaseConfig, DbPool};

pub struct TestDatabase {
    dir: tempfile::TempDir,
    path: PathBuf,
}

impl TestDatabase {
    pub fn new(prefix: &str) -> Self {
        let dir = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir()
            .expect("create test database directory");
        let path = dir.path().join("credvault.db");
        Self { dir, path }
    }

    pub fn url(&self) -> String {
        format!("sqlite://{}?mode=rwc", self.path.display())
    }

    /// Open a migrated pool on this file. May be called repeatedly to
    /// simulate a process restart.
    pub async fn open(&self) -> DbPool {
        let config = DatabaseConfig {
            url: self.url(),
            max_connections: 4,
            min_connections: 1,
            auto_migrate: true,
            ..Default::default()
        };
        create_pool(&config).await.expect("create file-backed pool")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}
