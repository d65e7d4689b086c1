use crate::ipc::error::{err, reply};
use crate::ipc::helpers::str_param;
use crate::ipc::types::{AppState, Request};
use crate::store::LmsStore;
use serde_json::json;

fn handle_courses_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let store = LmsStore::new(conn);
    let course_id = str_param(&req.params, "courseId").unwrap_or("");
    let title = str_param(&req.params, "title");
    let created_by = str_param(&req.params, "createdBy");

    reply(
        req,
        store.create_course(course_id, title, created_by).map(|course| {
            json!({ "course": serde_json::to_value(&course).unwrap_or_default() })
        }),
    )
}

fn handle_courses_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let store = LmsStore::new(conn);

    reply(
        req,
        store.list_courses().map(|courses| {
            json!({ "courses": serde_json::to_value(&courses).unwrap_or_default() })
        }),
    )
}

fn handle_enrollment_add(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let store = LmsStore::new(conn);
    let course_id = str_param(&req.params, "courseId").unwrap_or("");
    let student_id = str_param(&req.params, "studentId").unwrap_or("");

    reply(
        req,
        store
            .enroll_student(course_id, student_id)
            .map(|_| json!({ "enrolled": true })),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "courses.create" => Some(handle_courses_create(state, req)),
        "courses.list" => Some(handle_courses_list(state, req)),
        "enrollment.add" => Some(handle_enrollment_add(state, req)),
        _ => None,
    }
}
