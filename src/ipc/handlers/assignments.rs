use crate::ipc::error::{err, reply};
use crate::ipc::helpers::{num_param, str_param};
use crate::ipc::types::{AppState, Request};
use crate::store::LmsStore;
use serde_json::json;

fn handle_assignments_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let store = LmsStore::new(conn);
    let course_id = str_param(&req.params, "courseId").unwrap_or("");
    let assignment_id = str_param(&req.params, "assignmentId").unwrap_or("");
    let title = str_param(&req.params, "title");
    let max_points = num_param(&req.params, "maxPoints");
    let created_by = str_param(&req.params, "createdBy");

    reply(
        req,
        store
            .create_assignment(course_id, assignment_id, title, max_points, created_by)
            .map(|assignment| {
                json!({ "assignment": serde_json::to_value(&assignment).unwrap_or_default() })
            }),
    )
}

fn handle_assignments_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let store = LmsStore::new(conn);
    let course_id = str_param(&req.params, "courseId");

    reply(
        req,
        store.list_assignments(course_id).map(|assignments| {
            json!({ "assignments": serde_json::to_value(&assignments).unwrap_or_default() })
        }),
    )
}

fn handle_grading_grade(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let store = LmsStore::new(conn);
    let assignment_id = str_param(&req.params, "assignmentId").unwrap_or("");
    let student_id = str_param(&req.params, "studentId").unwrap_or("");
    let score = num_param(&req.params, "score");
    let feedback = str_param(&req.params, "feedback");

    reply(
        req,
        store
            .grade_assignment(assignment_id, student_id, score, feedback)
            .map(|submission| {
                json!({ "submission": serde_json::to_value(&submission).unwrap_or_default() })
            }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "assignments.create" => Some(handle_assignments_create(state, req)),
        "assignments.list" => Some(handle_assignments_list(state, req)),
        "grading.grade" => Some(handle_grading_grade(state, req)),
        _ => None,
    }
}
