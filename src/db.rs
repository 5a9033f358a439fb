use rusqlite::Connection;
use std::path::Path;

pub fn open_db(path: &Path) -> anyhow::Result<Connection> {
    let conn = Connection::open(path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            srn TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT,
            semester INTEGER NOT NULL,
            section TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class ON students(semester, section)",
        [],
    )?;

    // No FK from sessions/logs srn to students: ingest can land rows whose
    // srn no longer matches a roster row, and analytics must tolerate that.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS sessions(
            id TEXT PRIMARY KEY,
            srn TEXT NOT NULL,
            created_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_sessions_srn ON sessions(srn)",
        [],
    )?;

    // result is the session outcome JSON ({score, total_time_sec, steps});
    // NULL marks an incomplete session.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS logs(
            session_id TEXT PRIMARY KEY,
            srn TEXT NOT NULL,
            result TEXT,
            FOREIGN KEY(session_id) REFERENCES sessions(id)
        )",
        [],
    )?;
    conn.execute("CREATE INDEX IF NOT EXISTS idx_logs_srn ON logs(srn)", [])?;

    Ok(conn)
}
