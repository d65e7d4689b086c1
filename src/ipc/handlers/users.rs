use crate::ipc::error::{err, reply};
use crate::ipc::helpers::str_param;
use crate::ipc::types::{AppState, Request};
use crate::store::LmsStore;
use serde_json::json;

fn handle_users_upsert(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let store = LmsStore::new(conn);
    let user_id = str_param(&req.params, "userId").unwrap_or("");
    let role = str_param(&req.params, "role");
    let user_type = str_param(&req.params, "userType");

    reply(
        req,
        store.upsert_user(user_id, role, user_type).map(|user| {
            json!({ "user": serde_json::to_value(&user).unwrap_or_default() })
        }),
    )
}

fn handle_users_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let store = LmsStore::new(conn);
    let user_id = str_param(&req.params, "userId").unwrap_or("");

    reply(req, store.delete_user(user_id).map(|_| json!({ "deleted": true })))
}

fn handle_progress_student(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let store = LmsStore::new(conn);
    let student_id = str_param(&req.params, "studentId").unwrap_or("");

    reply(
        req,
        store
            .student_progress(student_id)
            .map(|report| serde_json::to_value(&report).unwrap_or_default()),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "users.upsert" => Some(handle_users_upsert(state, req)),
        "users.delete" => Some(handle_users_delete(state, req)),
        "progress.student" => Some(handle_progress_student(state, req)),
        _ => None,
    }
}
