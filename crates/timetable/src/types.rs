use crate::config::AppConfig;
use crate::db::TimetableDb;

/// State shared by every request handler.
pub struct AppState {
    pub db: TimetableDb,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(db: TimetableDb, config: AppConfig) -> Self {
        Self { db, config }
    }
}
