use actix_web::{web, HttpResponse, Responder};
use serde::Deserialize;
use serde_json::json;

use super::state::AppState;
use crate::calc;
use crate::store;

#[derive(Debug, Deserialize)]
pub struct ClassAnalyticsRequest {
    pub semester: i64,
    pub section: String,
}

#[derive(Debug, Deserialize)]
pub struct StudentAnalyticsRequest {
    #[serde(default)]
    pub srn: Option<String>,
}

fn bad_request(message: impl Into<String>) -> HttpResponse {
    HttpResponse::BadRequest().json(json!({ "error": message.into() }))
}

pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn class_analytics(
    state: web::Data<AppState>,
    body: web::Json<ClassAnalyticsRequest>,
) -> impl Responder {
    let db = match state.db.lock() {
        Ok(db) => db,
        Err(_) => return bad_request("store connection unavailable"),
    };

    let students = match store::students_in_class(&db, body.semester, &body.section) {
        Ok(v) => v,
        Err(e) => return bad_request(e.message),
    };
    if students.is_empty() {
        return HttpResponse::Ok()
            .json(calc::ClassReport::degraded("No students found for this class", 0));
    }

    let srns: Vec<String> = students.iter().map(|s| s.srn.clone()).collect();
    let sessions = match store::sessions_for_srns(&db, &srns) {
        Ok(v) => v,
        Err(e) => return bad_request(e.message),
    };
    if sessions.is_empty() {
        return HttpResponse::Ok().json(calc::ClassReport::degraded(
            "No sessions found for this class",
            students.len(),
        ));
    }

    let session_ids: Vec<String> = sessions.iter().map(|s| s.id.clone()).collect();
    let logs = match store::logs_for_sessions(&db, &session_ids) {
        Ok(v) => v,
        Err(e) => return bad_request(e.message),
    };
    if logs.is_empty() {
        return HttpResponse::Ok().json(calc::ClassReport::degraded(
            "No logs found for this class",
            students.len(),
        ));
    }

    HttpResponse::Ok().json(calc::class_report(
        body.semester,
        &body.section,
        &students,
        &logs,
    ))
}

pub async fn student_analytics(
    state: web::Data<AppState>,
    body: web::Json<StudentAnalyticsRequest>,
) -> impl Responder {
    let srn = match body.srn.as_deref() {
        Some(srn) if !srn.is_empty() => srn.to_string(),
        _ => return bad_request("SRN is required"),
    };

    let db = match state.db.lock() {
        Ok(db) => db,
        Err(_) => return bad_request("store connection unavailable"),
    };

    let student = match store::student_by_srn(&db, &srn) {
        Ok(v) => v,
        Err(e) => return bad_request(e.message),
    };
    let Some(student) = student else {
        return HttpResponse::NotFound().json(json!({ "error": "Student not found" }));
    };

    let sessions = match store::sessions_for_srn(&db, &student.srn) {
        Ok(v) => v,
        Err(e) => return bad_request(e.message),
    };
    if sessions.is_empty() {
        return HttpResponse::Ok().json(calc::StudentReport::empty(&student, 0));
    }

    let session_ids: Vec<String> = sessions.iter().map(|s| s.id.clone()).collect();
    let logs = match store::logs_for_sessions(&db, &session_ids) {
        Ok(v) => v,
        Err(e) => return bad_request(e.message),
    };
    if logs.is_empty() {
        // Session rows exist but none produced a log: the zero report carries
        // the raw session count, unlike the no-sessions branch above.
        return HttpResponse::Ok().json(calc::StudentReport::empty(&student, sessions.len()));
    }

    HttpResponse::Ok().json(calc::student_report(&student, &logs))
}
