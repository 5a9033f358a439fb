use actix_web::{test, web, App};
use labtrackd::api::{configure_routes, AppState};
use labtrackd::db::open_db;
use rusqlite::Connection;
use serde_json::{json, Value};
use std::path::PathBuf;
use tempfile::TempDir;

fn workspace() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("labtrack.sqlite3");
    (dir, path)
}

fn insert_student(conn: &Connection, srn: &str, name: &str, semester: i64, section: &str) {
    conn.execute(
        "INSERT INTO students(srn, name, email, semester, section) VALUES(?, ?, NULL, ?, ?)",
        (srn, name, semester, section),
    )
    .expect("student");
}

fn insert_session(conn: &Connection, id: &str, srn: &str) {
    conn.execute(
        "INSERT INTO sessions(id, srn, created_at) VALUES(?, ?, '2026-02-01T10:00:00Z')",
        (id, srn),
    )
    .expect("session");
}

fn insert_log(conn: &Connection, session_id: &str, srn: &str, result: Option<&Value>) {
    conn.execute(
        "INSERT INTO logs(session_id, srn, result) VALUES(?, ?, ?)",
        (session_id, srn, result.map(|v| v.to_string())),
    )
    .expect("log");
}

fn result_json(score: f64, total_time_sec: f64, steps: &[(&str, f64)]) -> Value {
    json!({
        "score": score,
        "total_time_sec": total_time_sec,
        "steps": steps
            .iter()
            .map(|(name, time)| json!({ "name": name, "time": time }))
            .collect::<Vec<_>>(),
    })
}

async fn post_class(
    path: &PathBuf,
    body: Value,
) -> (actix_web::http::StatusCode, Value) {
    let conn = open_db(path).expect("open db");
    let state = web::Data::new(AppState::new(conn));
    let app =
        test::init_service(App::new().app_data(state).configure(configure_routes)).await;
    let req = test::TestRequest::post()
        .uri("/class-analytics")
        .set_json(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    let status = resp.status();
    let value: Value = test::read_body_json(resp).await;
    (status, value)
}

#[actix_web::test]
async fn empty_roster_yields_degraded_zero_report() {
    let (_dir, path) = workspace();
    drop(open_db(&path).expect("create schema"));

    let (status, body) = post_class(&path, json!({ "semester": 5, "section": "A" })).await;
    assert_eq!(status, 200);
    assert_eq!(body["error"], "No students found for this class");
    assert_eq!(body["students_analyzed"], 0);
    assert_eq!(body["avg_score"], 0.0);
    assert_eq!(body["avg_total_time"], 0.0);
    assert_eq!(body["step_medians"], json!({}));
    assert_eq!(body["bottleneck_steps"], json!([]));
    assert_eq!(body["flagged_students"], json!([]));
    assert!(body.get("class").is_none());
}

#[actix_web::test]
async fn no_sessions_branch_reports_real_student_count() {
    let (_dir, path) = workspace();
    {
        let conn = open_db(&path).expect("open db");
        insert_student(&conn, "S001", "Ada Byrne", 5, "A");
        insert_student(&conn, "S002", "Ben Ito", 5, "A");
    }
    let (status, body) = post_class(&path, json!({ "semester": 5, "section": "A" })).await;
    assert_eq!(status, 200);
    assert_eq!(body["error"], "No sessions found for this class");
    assert_eq!(body["students_analyzed"], 2);
}

#[actix_web::test]
async fn no_logs_branch_reports_real_student_count() {
    let (_dir, path) = workspace();
    {
        let conn = open_db(&path).expect("open db");
        insert_student(&conn, "S001", "Ada Byrne", 5, "A");
        insert_session(&conn, "sess-1", "S001");
    }
    let (status, body) = post_class(&path, json!({ "semester": 5, "section": "A" })).await;
    assert_eq!(status, 200);
    assert_eq!(body["error"], "No logs found for this class");
    assert_eq!(body["students_analyzed"], 1);
}

#[actix_web::test]
async fn full_report_aggregates_and_detects_bottlenecks() {
    let (_dir, path) = workspace();
    {
        let conn = open_db(&path).expect("open db");
        insert_student(&conn, "S001", "Ada Byrne", 5, "A");
        insert_student(&conn, "S002", "Ben Ito", 5, "A");
        // A student from another section must not leak into the report.
        insert_student(&conn, "S900", "Zoe Webb", 5, "B");

        insert_session(&conn, "sess-1", "S001");
        insert_session(&conn, "sess-2", "S001");
        insert_session(&conn, "sess-3", "S002");
        insert_session(&conn, "sess-9", "S900");

        insert_log(
            &conn,
            "sess-1",
            "S001",
            Some(&result_json(8.0, 60.0, &[("Scrub", 10.0), ("Suture", 20.0)])),
        );
        insert_log(
            &conn,
            "sess-2",
            "S001",
            Some(&result_json(6.0, 80.0, &[("Scrub", 14.0), ("Suture", 30.0)])),
        );
        // Incomplete session: null result contributes nothing.
        insert_log(&conn, "sess-3", "S002", None);
        insert_log(
            &conn,
            "sess-9",
            "S900",
            Some(&result_json(1.0, 999.0, &[("Scrub", 500.0)])),
        );
    }

    let (status, body) = post_class(&path, json!({ "semester": 5, "section": "A" })).await;
    assert_eq!(status, 200);
    assert!(body.get("error").is_none());
    assert_eq!(body["class"], "5A");
    assert_eq!(body["students_analyzed"], 2);
    assert_eq!(body["avg_score"], 7.0);
    assert_eq!(body["avg_total_time"], 70.0);
    // Scrub [10, 14] -> lower-median picks sorted[1] = 14 (not 12).
    assert_eq!(body["step_medians"]["Scrub"], 14.0);
    // Suture [20, 30] -> 30, above the 15s bottleneck threshold.
    assert_eq!(body["step_medians"]["Suture"], 30.0);
    assert_eq!(body["bottleneck_steps"], json!(["Suture"]));
}

#[actix_web::test]
async fn flagged_students_follow_roster_order() {
    let (_dir, path) = workspace();
    {
        let conn = open_db(&path).expect("open db");
        insert_student(&conn, "S001", "Ada Byrne", 3, "C");
        insert_student(&conn, "S002", "Ben Ito", 3, "C");
        insert_student(&conn, "S003", "Cas Okafor", 3, "C");

        for (i, (srn, score)) in [("S001", 2.0), ("S002", 20.0), ("S003", 1.0)]
            .into_iter()
            .enumerate()
        {
            let id = format!("sess-{}", i);
            insert_session(&conn, &id, srn);
            insert_log(&conn, &id, srn, Some(&result_json(score, 60.0, &[])));
        }
    }

    let (status, body) = post_class(&path, json!({ "semester": 3, "section": "C" })).await;
    assert_eq!(status, 200);
    // Class avg = 23/3; S001 and S003 are more than 5 below it.
    let flagged = body["flagged_students"].as_array().expect("array");
    assert_eq!(flagged.len(), 2);
    assert_eq!(flagged[0]["srn"], "S001");
    assert_eq!(flagged[0]["flagged_for"], "Low Score");
    assert_eq!(flagged[1]["srn"], "S003");
}

#[actix_web::test]
async fn store_failure_maps_to_bad_request() {
    let (_dir, path) = workspace();
    let conn = open_db(&path).expect("open db");
    insert_student(&conn, "S001", "Ada Byrne", 5, "A");
    insert_session(&conn, "sess-1", "S001");
    // Break the store out from under the handler: the logs query must fail
    // and surface as a 400 with the failure message.
    conn.execute("DROP TABLE logs", []).expect("drop logs");

    let state = web::Data::new(AppState::new(conn));
    let app =
        test::init_service(App::new().app_data(state).configure(configure_routes)).await;
    let req = test::TestRequest::post()
        .uri("/class-analytics")
        .set_json(json!({ "semester": 5, "section": "A" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    let message = body["error"].as_str().expect("error string");
    assert!(!message.is_empty());
}

#[actix_web::test]
async fn rerun_with_same_data_is_byte_identical() {
    let (_dir, path) = workspace();
    {
        let conn = open_db(&path).expect("open db");
        insert_student(&conn, "S001", "Ada Byrne", 5, "A");
        insert_session(&conn, "sess-1", "S001");
        insert_log(
            &conn,
            "sess-1",
            "S001",
            Some(&result_json(7.0, 55.0, &[("Scrub", 12.0), ("Suture", 17.0)])),
        );
    }

    let conn = open_db(&path).expect("open db");
    let state = web::Data::new(AppState::new(conn));
    let app =
        test::init_service(App::new().app_data(state).configure(configure_routes)).await;

    let mut bodies = Vec::new();
    for _ in 0..2 {
        let req = test::TestRequest::post()
            .uri("/class-analytics")
            .set_json(json!({ "semester": 5, "section": "A" }))
            .to_request();
        bodies.push(test::call_and_read_body(&app, req).await);
    }
    assert_eq!(bodies[0], bodies[1]);
}
