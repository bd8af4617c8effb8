use crate::config;
use crate::exams::SqliteExamBank;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{resolve_class, roster_err};
use crate::ipc::types::{AppState, Request};
use crate::roster::{
    Confirmation, Provisioning, Release, RemoveOutcome, RosterManager, SqliteStore, Student,
};
use serde_json::json;

type WorkspaceRoster<'a> = RosterManager<'a, SqliteStore<'a>, SqliteExamBank<'a>>;

fn with_roster(
    state: &AppState,
    req: &Request,
    f: impl FnOnce(&WorkspaceRoster<'_>) -> serde_json::Value,
) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let settings = match config::load_roster_settings(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let layout = match config::load_exam_bank_settings(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let roster = RosterManager::new(
        SqliteStore::new(conn),
        SqliteExamBank::new(conn, layout),
        &state.ids,
        &settings,
    );
    f(&roster)
}

fn student_json(student: &Student) -> serde_json::Value {
    json!({
        "id": student.id,
        "fullName": student.full_name,
        "studentId": student.student_id
    })
}

fn handle_roster_add(state: &mut AppState, req: &Request) -> serde_json::Value {
    let class = match resolve_class(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let Some(full_name) = req.params.get("fullName").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing fullName", None);
    };

    with_roster(state, req, |roster| match roster.add_student(&class, full_name) {
        Ok(added) => {
            let provisioning_error = match &added.provisioning {
                Provisioning::Provisioned => None,
                Provisioning::Failed(e) => Some(e.to_string()),
            };
            ok(
                &req.id,
                json!({
                    "classId": class,
                    "student": student_json(&added.student),
                    "rosterSize": added.roster_size,
                    "provisioned": provisioning_error.is_none(),
                    "provisioningError": provisioning_error
                }),
            )
        }
        Err(e) => roster_err(req, &e),
    })
}

fn handle_roster_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let class = match resolve_class(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    with_roster(state, req, |roster| match roster.list_students(&class) {
        Ok(students) => {
            let rows: Vec<serde_json::Value> = students
                .iter()
                .enumerate()
                .map(|(i, s)| {
                    json!({
                        "index": i + 1,
                        "id": s.id,
                        "fullName": s.full_name,
                        "studentId": s.student_id
                    })
                })
                .collect();
            ok(
                &req.id,
                json!({
                    "classId": class,
                    "count": rows.len(),
                    "students": rows
                }),
            )
        }
        Err(e) => roster_err(req, &e),
    })
}

fn handle_roster_remove(state: &mut AppState, req: &Request) -> serde_json::Value {
    let class = match resolve_class(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let student_id = match req.params.get("studentId").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.to_string(),
        _ => return err(&req.id, "bad_params", "missing studentId", None),
    };
    // No answer from the confirm prompt means no removal.
    let confirmed = req
        .params
        .get("confirmed")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    with_roster(state, req, |roster| {
        match roster.remove_student(&class, &student_id, Confirmation::from_flag(confirmed)) {
            Ok(RemoveOutcome::Declined) => ok(
                &req.id,
                json!({
                    "classId": class,
                    "confirmed": false,
                    "removed": false,
                    "releasedExamSlots": false
                }),
            ),
            Ok(RemoveOutcome::NotFound) => ok(
                &req.id,
                json!({
                    "classId": class,
                    "confirmed": true,
                    "removed": false,
                    "releasedExamSlots": false
                }),
            ),
            Ok(RemoveOutcome::Removed { students, release }) => {
                let release_error = match &release {
                    Release::Failed(e) => Some(e.to_string()),
                    _ => None,
                };
                ok(
                    &req.id,
                    json!({
                        "classId": class,
                        "confirmed": true,
                        "removed": true,
                        "student": students.first().map(student_json),
                        "removedCount": students.len(),
                        "releasedExamSlots": matches!(release, Release::Released),
                        "releaseError": release_error
                    }),
                )
            }
            Err(e) => roster_err(req, &e),
        }
    })
}

fn handle_roster_reconcile(state: &mut AppState, req: &Request) -> serde_json::Value {
    let class = match resolve_class(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    with_roster(state, req, |roster| match roster.reconcile(&class) {
        Ok(report) => ok(
            &req.id,
            json!({
                "classId": class,
                "checked": report.checked,
                "provisioned": report.provisioned.len(),
                "studentIds": report.provisioned
            }),
        ),
        Err(e) => roster_err(req, &e),
    })
}

fn handle_roster_classes(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_roster(state, req, |roster| match roster.class_summaries() {
        Ok(classes) => {
            let rows: Vec<serde_json::Value> = classes
                .iter()
                .map(|c| json!({ "classId": c.class_id, "studentCount": c.student_count }))
                .collect();
            ok(&req.id, json!({ "classes": rows }))
        }
        Err(e) => roster_err(req, &e),
    })
}

fn handle_roster_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    let raw = match req.params.get("classLists") {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(v @ serde_json::Value::Object(_)) => v.to_string(),
        _ => {
            return err(
                &req.id,
                "bad_params",
                "classLists must be a JSON object or its string form",
                None,
            )
        }
    };

    with_roster(state, req, |roster| {
        let classes = match roster.import_class_lists(&raw) {
            Ok(v) => v,
            Err(e) => return roster_err(req, &e),
        };
        // Imported students predate this workspace's exam bank.
        let mut provisioned = 0usize;
        for c in &classes {
            match roster.reconcile(&c.class_id) {
                Ok(report) => provisioned += report.provisioned.len(),
                Err(e) => return roster_err(req, &e),
            }
        }
        let rows: Vec<serde_json::Value> = classes
            .iter()
            .map(|c| json!({ "classId": c.class_id, "studentCount": c.student_count }))
            .collect();
        ok(
            &req.id,
            json!({
                "classes": rows,
                "provisioned": provisioned
            }),
        )
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "roster.add" => Some(handle_roster_add(state, req)),
        "roster.list" => Some(handle_roster_list(state, req)),
        "roster.remove" => Some(handle_roster_remove(state, req)),
        "roster.reconcile" => Some(handle_roster_reconcile(state, req)),
        "roster.classes" => Some(handle_roster_classes(state, req)),
        "roster.importClassLists" => Some(handle_roster_import(state, req)),
        _ => None,
    }
}
