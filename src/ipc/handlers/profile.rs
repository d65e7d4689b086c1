use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{num_param, str_param};
use crate::ipc::types::{AppState, Request};
use crate::profile::ProfileStore;
use serde_json::json;

fn storage_err(req: &Request, e: anyhow::Error) -> serde_json::Value {
    err(&req.id, "storage_failed", e.to_string(), None)
}

fn handle_profile_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match ProfileStore::new(conn).load() {
        Ok(profile) => ok(
            &req.id,
            json!({ "profile": serde_json::to_value(&profile).unwrap_or_default() }),
        ),
        Err(e) => storage_err(req, e),
    }
}

fn handle_profile_award(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let category = str_param(&req.params, "category").unwrap_or("");
    let Some(amount) = num_param(&req.params, "amount").filter(|v| v.is_finite()) else {
        return err(&req.id, "bad_params", "missing or non-numeric amount", None);
    };
    match ProfileStore::new(conn).award(category, amount.trunc() as i64) {
        Ok(profile) => ok(
            &req.id,
            json!({ "profile": serde_json::to_value(&profile).unwrap_or_default() }),
        ),
        Err(e) => storage_err(req, e),
    }
}

fn handle_profile_promote(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match ProfileStore::new(conn).promote() {
        Ok((promoted, profile)) => ok(
            &req.id,
            json!({
                "promoted": promoted,
                "profile": serde_json::to_value(&profile).unwrap_or_default()
            }),
        ),
        Err(e) => storage_err(req, e),
    }
}

fn handle_profile_challenge(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match ProfileStore::new(conn).challenge_config() {
        Ok(config) => ok(&req.id, serde_json::to_value(&config).unwrap_or_default()),
        Err(e) => storage_err(req, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "profile.get" => Some(handle_profile_get(state, req)),
        "profile.award" => Some(handle_profile_award(state, req)),
        "profile.promote" => Some(handle_profile_promote(state, req)),
        "profile.challenge" => Some(handle_profile_challenge(state, req)),
        _ => None,
    }
}
