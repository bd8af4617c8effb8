use crate::exams;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::resolve_class;
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_exambank_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let class = match resolve_class(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    match exams::list_class(conn, &class) {
        Ok(students) => ok(
            &req.id,
            json!({
                "classId": class,
                "students": students
            }),
        ),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "exambank.list" => Some(handle_exambank_list(state, req)),
        _ => None,
    }
}
