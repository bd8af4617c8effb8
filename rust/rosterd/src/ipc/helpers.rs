use serde_json::json;

use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::roster::{ClassId, RosterError};

/// Explicit `params.classId` wins; otherwise the signed-in user's class level.
pub fn resolve_class(state: &AppState, req: &Request) -> Result<ClassId, serde_json::Value> {
    if let Some(raw) = req.params.get("classId").and_then(|v| v.as_str()) {
        return ClassId::parse(raw)
            .ok_or_else(|| err(&req.id, "bad_params", "classId must not be empty", None));
    }
    state
        .user
        .as_ref()
        .and_then(|u| u.class_level())
        .ok_or_else(|| {
            err(
                &req.id,
                "no_class",
                "no classId given and the current user has no class",
                None,
            )
        })
}

pub fn roster_err(req: &Request, e: &RosterError) -> serde_json::Value {
    let details = match e {
        RosterError::WriteConflict { class, attempts } => {
            Some(json!({ "classId": class, "attempts": attempts }))
        }
        _ => None,
    };
    err(&req.id, e.code(), e.to_string(), details)
}
