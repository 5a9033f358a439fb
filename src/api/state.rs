use std::sync::Mutex;

use rusqlite::Connection;

/// Shared application state. The store is read-only for this service; the
/// mutex only serializes access to the single connection.
pub struct AppState {
    pub db: Mutex<Connection>,
}

impl AppState {
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Mutex::new(conn),
        }
    }
}
