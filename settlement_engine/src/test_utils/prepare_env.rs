use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite};

use crate::SqliteDatabase;

/// Creates a fresh database at `url`, with every migration applied. Any database already at `url` is dropped first.
pub async fn prepare_test_env(url: &str) {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    debug!("🚀️ Logging initialised");
    recreate_database(url).await;
    let db = SqliteDatabase::new_with_url(url, 1).await.expect("Error connecting to the test database");
    db.run_migrations().await.expect("Error running migrations on the test database");
    db.pool().close().await;
    info!("🚀️ Test database ready at {url}");
}

/// A database URL in the system temp directory that no other test will pick.
pub fn random_db_path() -> String {
    let dir = std::env::temp_dir();
    format!("sqlite://{}/settlement_test_{}.db", dir.display(), rand::random::<u64>())
}

async fn recreate_database(url: &str) {
    if Sqlite::database_exists(url).await.unwrap_or(false) {
        if let Err(e) = Sqlite::drop_database(url).await {
            warn!("🚀️ Could not drop the old test database {url}: {e}");
        }
    }
    Sqlite::create_database(url).await.expect("Error creating the test database");
}
