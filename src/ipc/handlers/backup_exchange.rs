use crate::backup;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::str_param;
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn handle_backup_export(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(out_path) = str_param(&req.params, "outPath").map(PathBuf::from) else {
        return err(&req.id, "bad_params", "missing params.outPath", None);
    };

    match backup::export_store_bundle(conn, &out_path) {
        Ok(summary) => ok(
            &req.id,
            json!({
                "bundleFormat": summary.bundle_format,
                "entryCount": summary.entry_count,
                "outPath": out_path.to_string_lossy(),
            }),
        ),
        Err(e) => err(&req.id, "export_failed", format!("{e:#}"), None),
    }
}

fn handle_backup_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(in_path) = str_param(&req.params, "inPath").map(PathBuf::from) else {
        return err(&req.id, "bad_params", "missing params.inPath", None);
    };

    match backup::import_store_bundle(&in_path, conn) {
        Ok(summary) => ok(
            &req.id,
            json!({
                "bundleFormatDetected": summary.bundle_format_detected,
                "users": summary.users,
                "courses": summary.courses,
            }),
        ),
        Err(e) => err(&req.id, "import_failed", format!("{e:#}"), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "backup.export" => Some(handle_backup_export(state, req)),
        "backup.import" => Some(handle_backup_import(state, req)),
        _ => None,
    }
}
