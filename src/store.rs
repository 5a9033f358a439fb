use rusqlite::{params_from_iter, types::Value, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct StoreError {
    pub code: String,
    pub message: String,
}

impl StoreError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StudentRow {
    pub srn: String,
    pub name: String,
    pub email: Option<String>,
    pub semester: i64,
    pub section: String,
}

#[derive(Debug, Clone)]
pub struct SessionRow {
    pub id: String,
    pub srn: String,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LogRow {
    pub session_id: String,
    pub srn: String,
    pub result: Option<SessionResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResult {
    pub score: f64,
    pub total_time_sec: f64,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    pub time: f64,
}

pub fn students_in_class(
    conn: &Connection,
    semester: i64,
    section: &str,
) -> Result<Vec<StudentRow>, StoreError> {
    let mut stmt = conn
        .prepare(
            "SELECT srn, name, email, semester, section
             FROM students
             WHERE semester = ? AND section = ?
             ORDER BY srn",
        )
        .map_err(|e| StoreError::new("db_query_failed", e.to_string()))?;
    stmt.query_map((semester, section), |r| {
        Ok(StudentRow {
            srn: r.get(0)?,
            name: r.get(1)?,
            email: r.get(2)?,
            semester: r.get(3)?,
            section: r.get(4)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(|e| StoreError::new("db_query_failed", e.to_string()))
}

pub fn student_by_srn(conn: &Connection, srn: &str) -> Result<Option<StudentRow>, StoreError> {
    conn.query_row(
        "SELECT srn, name, email, semester, section FROM students WHERE srn = ?",
        [srn],
        |r| {
            Ok(StudentRow {
                srn: r.get(0)?,
                name: r.get(1)?,
                email: r.get(2)?,
                semester: r.get(3)?,
                section: r.get(4)?,
            })
        },
    )
    .optional()
    .map_err(|e| StoreError::new("db_query_failed", e.to_string()))
}

pub fn sessions_for_srn(conn: &Connection, srn: &str) -> Result<Vec<SessionRow>, StoreError> {
    let mut stmt = conn
        .prepare("SELECT id, srn, created_at FROM sessions WHERE srn = ? ORDER BY id")
        .map_err(|e| StoreError::new("db_query_failed", e.to_string()))?;
    stmt.query_map([srn], |r| {
        Ok(SessionRow {
            id: r.get(0)?,
            srn: r.get(1)?,
            created_at: r.get(2)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(|e| StoreError::new("db_query_failed", e.to_string()))
}

pub fn sessions_for_srns(
    conn: &Connection,
    srns: &[String],
) -> Result<Vec<SessionRow>, StoreError> {
    if srns.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = std::iter::repeat("?")
        .take(srns.len())
        .collect::<Vec<_>>()
        .join(",");
    let sql = format!(
        "SELECT id, srn, created_at FROM sessions WHERE srn IN ({}) ORDER BY id",
        placeholders
    );
    let values: Vec<Value> = srns.iter().map(|s| Value::Text(s.clone())).collect();
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| StoreError::new("db_query_failed", e.to_string()))?;
    stmt.query_map(params_from_iter(values), |r| {
        Ok(SessionRow {
            id: r.get(0)?,
            srn: r.get(1)?,
            created_at: r.get(2)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(|e| StoreError::new("db_query_failed", e.to_string()))
}

pub fn logs_for_sessions(
    conn: &Connection,
    session_ids: &[String],
) -> Result<Vec<LogRow>, StoreError> {
    if session_ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = std::iter::repeat("?")
        .take(session_ids.len())
        .collect::<Vec<_>>()
        .join(",");
    let sql = format!(
        "SELECT session_id, srn, result FROM logs WHERE session_id IN ({}) ORDER BY session_id",
        placeholders
    );
    let values: Vec<Value> = session_ids.iter().map(|s| Value::Text(s.clone())).collect();
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| StoreError::new("db_query_failed", e.to_string()))?;
    let rows = stmt
        .query_map(params_from_iter(values), |r| {
            let session_id: String = r.get(0)?;
            let srn: String = r.get(1)?;
            let raw: Option<String> = r.get(2)?;
            Ok((session_id, srn, raw))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| StoreError::new("db_query_failed", e.to_string()))?;

    Ok(rows
        .into_iter()
        .map(|(session_id, srn, raw)| {
            let result = parse_result(&session_id, raw);
            LogRow {
                session_id,
                srn,
                result,
            }
        })
        .collect())
}

/// An unreadable result payload is treated the same as an absent one: the
/// session is incomplete and contributes nothing to aggregates.
fn parse_result(session_id: &str, raw: Option<String>) -> Option<SessionResult> {
    let raw = raw?;
    match serde_json::from_str(&raw) {
        Ok(v) => Some(v),
        Err(e) => {
            log::warn!("log {}: skipping unreadable result payload: {}", session_id, e);
            None
        }
    }
}
