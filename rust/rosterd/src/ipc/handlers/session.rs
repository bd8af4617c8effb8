use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::session::CurrentUser;
use serde_json::json;

fn handle_session_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    let user: CurrentUser = match serde_json::from_value(req.params.clone()) {
        Ok(u) => u,
        Err(e) => return err(&req.id, "bad_params", e.to_string(), None),
    };
    if user.name.trim().is_empty() {
        return err(&req.id, "bad_params", "name must not be empty", None);
    }
    let class_level = user.class_level();
    tracing::info!(
        user = %user.name,
        class_level = class_level.as_ref().map(|c| c.as_str()).unwrap_or("-"),
        "session user set"
    );
    state.user = Some(user);
    ok(&req.id, json!({ "classLevel": class_level }))
}

fn handle_session_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let class_level = state.user.as_ref().and_then(|u| u.class_level());
    ok(
        &req.id,
        json!({
            "user": state.user,
            "classLevel": class_level
        }),
    )
}

fn handle_session_clear(state: &mut AppState, req: &Request) -> serde_json::Value {
    state.user = None;
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "session.set" => Some(handle_session_set(state, req)),
        "session.get" => Some(handle_session_get(state, req)),
        "session.clear" => Some(handle_session_clear(state, req)),
        _ => None,
    }
}
