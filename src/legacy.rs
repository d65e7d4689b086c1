use serde_json::Value;

use crate::store::KvSlot;

// Ambient keys written by the pre-store pages. Read-only inputs to the
// legacy import; the store never writes them.
pub const VAULT_USERS_KEY: &str = "vault_users";
pub const ROSTER_KEY: &str = "ninja_roster_full";
pub const SESSION_USER_KEY: &str = "ninjaUser";
pub const SESSION_ROLE_KEY: &str = "userRole";
pub const SESSION_TYPE_KEY: &str = "userType";

#[derive(Debug, Clone)]
pub struct LegacyTeacher {
    pub id: String,
    pub it_sensei: bool,
}

/// Explicit inputs to the one-shot migration, so fixtures can drive it
/// without touching a real workspace.
#[derive(Debug, Clone, Default)]
pub struct LegacyInputs {
    pub teachers: Vec<LegacyTeacher>,
    pub roster_ids: Vec<String>,
    pub session_user: Option<String>,
    pub session_role: Option<String>,
    pub session_type: Option<String>,
}

/// Legacy values were written by hand-rolled JS; anything that is not a JSON
/// object is treated as absent.
fn safe_parse_object(raw: Option<&str>) -> Option<Value> {
    let value: Value = serde_json::from_str(raw?).ok()?;
    value.is_object().then_some(value)
}

/// Teacher registry shape: `{"teachers": {"<id>": {"role": "..."}}}`.
/// A record is IT_SENSEI only when it says so; everything else, including
/// non-object records, imports as a plain SENSEI.
pub fn parse_vault_users(value: Option<&Value>) -> Vec<LegacyTeacher> {
    let Some(teachers) = value
        .and_then(|v| v.get("teachers"))
        .and_then(|v| v.as_object())
    else {
        return Vec::new();
    };
    teachers
        .iter()
        .map(|(id, record)| {
            let it_sensei = record
                .get("role")
                .and_then(|r| r.as_str())
                .map(|r| r.trim().eq_ignore_ascii_case("IT_SENSEI"))
                .unwrap_or(false);
            LegacyTeacher {
                id: id.clone(),
                it_sensei,
            }
        })
        .collect()
}

/// Roster shape: a map keyed by student id. Only the keys matter.
pub fn parse_roster(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(|v| v.as_object())
        .map(|m| m.keys().cloned().collect())
        .unwrap_or_default()
}

/// Gathers the ambient legacy keys out of the slot. Malformed registry or
/// roster blobs degrade to empty, never to an error.
pub fn collect_inputs(slot: &dyn KvSlot) -> anyhow::Result<LegacyInputs> {
    let vault = safe_parse_object(slot.get(VAULT_USERS_KEY)?.as_deref());
    let roster = safe_parse_object(slot.get(ROSTER_KEY)?.as_deref());
    Ok(LegacyInputs {
        teachers: parse_vault_users(vault.as_ref()),
        roster_ids: parse_roster(roster.as_ref()),
        session_user: slot.get(SESSION_USER_KEY)?,
        session_role: slot.get(SESSION_ROLE_KEY)?,
        session_type: slot.get(SESSION_TYPE_KEY)?,
    })
}
