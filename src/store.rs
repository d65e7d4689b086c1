use anyhow::Context;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::legacy::LegacyInputs;

/// Slot key holding the serialized LMS document.
pub const DB_KEY: &str = "lms_db_v1";

/// Minimal key-value persistence surface. The real workspace backs this with
/// the SQLite `kv` table; tests use `MemoryKv`.
pub trait KvSlot {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
}

/// In-memory slot for unit tests and fixtures.
pub struct MemoryKv {
    cells: std::cell::RefCell<BTreeMap<String, String>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        MemoryKv {
            cells: std::cell::RefCell::new(BTreeMap::new()),
        }
    }

    pub fn seed(&self, key: &str, value: &str) {
        self.cells
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
    }
}

impl Default for MemoryKv {
    fn default() -> Self {
        MemoryKv::new()
    }
}

impl KvSlot for MemoryKv {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.cells.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.cells
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Closed role set. Anything unrecognized decodes as `Student`; that fallback
/// is part of the store contract, not an accident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    Admin,
    ItSensei,
    Sensei,
    Student,
    Guest,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::ItSensei => "IT_SENSEI",
            Role::Sensei => "SENSEI",
            Role::Student => "STUDENT",
            Role::Guest => "GUEST",
        }
    }

    pub fn parse_lossy(raw: &str) -> Role {
        match raw.trim().to_ascii_uppercase().as_str() {
            "ADMIN" => Role::Admin,
            "IT_SENSEI" => Role::ItSensei,
            "SENSEI" => Role::Sensei,
            "GUEST" => Role::Guest,
            _ => Role::Student,
        }
    }
}

impl From<String> for Role {
    fn from(raw: String) -> Self {
        Role::parse_lossy(&raw)
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.as_str().to_string()
    }
}

/// Only `Graded` is ever written today; the other states exist in the wire
/// shape as an extension point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionStatus {
    Draft,
    Submitted,
    Graded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub role: Role,
    pub user_type: String,
    pub created_at: String,
    pub updated_at: String,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: String,
    pub title: String,
    pub created_by: String,
    pub created_at: String,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub id: String,
    pub course_id: String,
    pub title: String,
    pub max_points: i64,
    pub created_by: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub student_id: String,
    pub assignment_id: String,
    pub score: i64,
    pub max_points: i64,
    pub feedback: String,
    pub status: SubmissionStatus,
    pub submitted_at: String,
    pub graded_at: String,
}

/// The whole store is one versioned document, read and written in full on
/// every operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Document {
    pub version: u32,
    pub users: BTreeMap<String, User>,
    pub courses: BTreeMap<String, Course>,
    pub enrollments: BTreeMap<String, Vec<String>>,
    pub assignments: BTreeMap<String, Assignment>,
    pub submissions: BTreeMap<String, BTreeMap<String, Submission>>,
}

impl Default for Document {
    fn default() -> Self {
        Document {
            version: 1,
            users: BTreeMap::new(),
            courses: BTreeMap::new(),
            enrollments: BTreeMap::new(),
            assignments: BTreeMap::new(),
            submissions: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReport {
    pub student_id: String,
    pub courses: Vec<String>,
    pub graded_count: usize,
    pub average_percent: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub teachers_merged: usize,
    pub roster_merged: usize,
    pub admin_applied: bool,
    pub total_users: usize,
}

/// Validation failures callers are expected to branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    UserIdRequired,
    CourseIdRequired,
    CourseExists,
    CourseAndStudentRequired,
    CourseNotFound,
    CourseAndAssignmentRequired,
    AssignmentExists,
    AssignmentStudentScoreRequired,
    AssignmentNotFound,
    StudentNotFound,
}

impl Rejection {
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::UserIdRequired => "USER_ID_REQUIRED",
            Rejection::CourseIdRequired => "COURSE_ID_REQUIRED",
            Rejection::CourseExists => "COURSE_EXISTS",
            Rejection::CourseAndStudentRequired => "COURSE_AND_STUDENT_REQUIRED",
            Rejection::CourseNotFound => "COURSE_NOT_FOUND",
            Rejection::CourseAndAssignmentRequired => "COURSE_AND_ASSIGNMENT_REQUIRED",
            Rejection::AssignmentExists => "ASSIGNMENT_EXISTS",
            Rejection::AssignmentStudentScoreRequired => "ASSIGNMENT_STUDENT_SCORE_REQUIRED",
            Rejection::AssignmentNotFound => "ASSIGNMENT_NOT_FOUND",
            Rejection::StudentNotFound => "STUDENT_NOT_FOUND",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Rejection::UserIdRequired => "user id is required",
            Rejection::CourseIdRequired => "course id is required",
            Rejection::CourseExists => "course already exists",
            Rejection::CourseAndStudentRequired => "course id and student id are required",
            Rejection::CourseNotFound => "course not found",
            Rejection::CourseAndAssignmentRequired => "course id and assignment id are required",
            Rejection::AssignmentExists => "assignment already exists",
            Rejection::AssignmentStudentScoreRequired => {
                "assignment id, student id and a finite score are required"
            }
            Rejection::AssignmentNotFound => "assignment not found",
            Rejection::StudentNotFound => "student not found",
        }
    }
}

/// Two tiers: rejections are part of the operation contract; storage faults
/// come from the slot itself and carry the underlying cause.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{}: {}", .0.code(), .0.message())]
    Rejected(Rejection),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

fn rejected<T>(r: Rejection) -> Result<T, StoreError> {
    Err(StoreError::Rejected(r))
}

/// Canonical id form: trimmed, uppercased. Empty means "not provided".
pub fn canon(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Legacy docs may carry maxPoints values this build would never write.
/// Mirror the original coercion: truncate, 0/garbage falls back to 100,
/// anything else is floored at 1.
fn coerce_max_points(raw: Option<f64>) -> i64 {
    match raw {
        Some(v) if v.is_finite() => {
            let n = v.trunc() as i64;
            if n == 0 {
                100
            } else {
                n.max(1)
            }
        }
        _ => 100,
    }
}

pub struct LmsStore<'a> {
    slot: &'a dyn KvSlot,
}

impl<'a> LmsStore<'a> {
    pub fn new(slot: &'a dyn KvSlot) -> Self {
        LmsStore { slot }
    }

    /// Reads the document, synthesizing defaults when the slot is empty or
    /// holds something unreadable. Parse failures are deliberately not
    /// surfaced; a broken blob behaves like a missing one.
    pub fn load(&self) -> Result<Document, StoreError> {
        let raw = self.slot.get(DB_KEY)?;
        Ok(match raw {
            Some(text) => match serde_json::from_str(&text) {
                Ok(doc) => doc,
                Err(e) => {
                    log::warn!("stored document unreadable, starting fresh: {}", e);
                    Document::default()
                }
            },
            None => Document::default(),
        })
    }

    fn save(&self, doc: &Document) -> Result<(), StoreError> {
        let text = serde_json::to_string(doc).context("serialize document")?;
        self.slot.set(DB_KEY, &text)?;
        Ok(())
    }

    pub fn upsert_user(
        &self,
        id: &str,
        role: Option<&str>,
        user_type: Option<&str>,
    ) -> Result<User, StoreError> {
        let key = canon(id);
        if key.is_empty() {
            return rejected(Rejection::UserIdRequired);
        }
        let mut doc = self.load()?;

        let existing = doc.users.get(&key);
        let role = match role.map(str::trim).filter(|r| !r.is_empty()) {
            Some(r) => Role::parse_lossy(r),
            None => existing.map(|u| u.role).unwrap_or(Role::Student),
        };
        let user_type = match user_type.map(str::trim).filter(|t| !t.is_empty()) {
            Some(t) => t.to_ascii_uppercase(),
            None => existing
                .map(|u| u.user_type.clone())
                .unwrap_or_else(|| "MEMBER".to_string()),
        };
        let created_at = existing
            .map(|u| u.created_at.clone())
            .unwrap_or_else(now_iso);

        let user = User {
            id: key.clone(),
            role,
            user_type,
            created_at,
            updated_at: now_iso(),
            active: true,
        };
        doc.users.insert(key, user.clone());
        self.save(&doc)?;
        Ok(user)
    }

    /// Removes the user plus every enrollment and submission entry that
    /// references it, in one write. A missing user is not an error.
    pub fn delete_user(&self, id: &str) -> Result<(), StoreError> {
        let key = canon(id);
        if key.is_empty() {
            return rejected(Rejection::UserIdRequired);
        }
        let mut doc = self.load()?;
        doc.users.remove(&key);
        for roster in doc.enrollments.values_mut() {
            roster.retain(|sid| canon(sid) != key);
        }
        for submap in doc.submissions.values_mut() {
            submap.retain(|sid, _| canon(sid) != key);
        }
        self.save(&doc)?;
        log::debug!("deleted user {}", key);
        Ok(())
    }

    pub fn create_course(
        &self,
        id: &str,
        title: Option<&str>,
        created_by: Option<&str>,
    ) -> Result<Course, StoreError> {
        let cid = canon(id);
        if cid.is_empty() {
            return rejected(Rejection::CourseIdRequired);
        }
        let mut doc = self.load()?;
        if doc.courses.contains_key(&cid) {
            return rejected(Rejection::CourseExists);
        }

        let title = title
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(&cid)
            .to_string();
        let course = Course {
            id: cid.clone(),
            title,
            created_by: canon(created_by.unwrap_or("SYSTEM")),
            created_at: now_iso(),
            active: true,
        };
        doc.courses.insert(cid.clone(), course.clone());
        doc.enrollments.entry(cid).or_default();
        self.save(&doc)?;
        Ok(course)
    }

    pub fn list_courses(&self) -> Result<Vec<Course>, StoreError> {
        Ok(self.load()?.courses.into_values().collect())
    }

    /// Set semantics over an ordered roster: a student appears at most once,
    /// in first-enrollment order. Unknown students get a minimal record.
    pub fn enroll_student(&self, course_id: &str, student_id: &str) -> Result<(), StoreError> {
        let cid = canon(course_id);
        let sid = canon(student_id);
        if cid.is_empty() || sid.is_empty() {
            return rejected(Rejection::CourseAndStudentRequired);
        }
        let mut doc = self.load()?;
        if !doc.courses.contains_key(&cid) {
            return rejected(Rejection::CourseNotFound);
        }

        if !doc.users.contains_key(&sid) {
            let stamp = now_iso();
            doc.users.insert(
                sid.clone(),
                User {
                    id: sid.clone(),
                    role: Role::Student,
                    user_type: "MEMBER".to_string(),
                    created_at: stamp.clone(),
                    updated_at: stamp,
                    active: true,
                },
            );
        }

        let roster = doc.enrollments.entry(cid).or_default();
        if !roster.contains(&sid) {
            roster.push(sid.clone());
        }
        if let Some(user) = doc.users.get_mut(&sid) {
            user.updated_at = now_iso();
        }
        self.save(&doc)?;
        Ok(())
    }

    pub fn create_assignment(
        &self,
        course_id: &str,
        assignment_id: &str,
        title: Option<&str>,
        max_points: Option<f64>,
        created_by: Option<&str>,
    ) -> Result<Assignment, StoreError> {
        let cid = canon(course_id);
        let aid = canon(assignment_id);
        if cid.is_empty() || aid.is_empty() {
            return rejected(Rejection::CourseAndAssignmentRequired);
        }
        let mut doc = self.load()?;
        if !doc.courses.contains_key(&cid) {
            return rejected(Rejection::CourseNotFound);
        }
        if doc.assignments.contains_key(&aid) {
            return rejected(Rejection::AssignmentExists);
        }

        let title = title
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(&aid)
            .to_string();
        let assignment = Assignment {
            id: aid.clone(),
            course_id: cid,
            title,
            max_points: coerce_max_points(max_points),
            created_by: canon(created_by.unwrap_or("SYSTEM")),
            created_at: now_iso(),
        };
        doc.assignments.insert(aid.clone(), assignment.clone());
        doc.submissions.entry(aid).or_default();
        self.save(&doc)?;
        Ok(assignment)
    }

    pub fn list_assignments(&self, course_id: Option<&str>) -> Result<Vec<Assignment>, StoreError> {
        let cid = course_id.map(canon).filter(|c| !c.is_empty());
        let doc = self.load()?;
        Ok(doc
            .assignments
            .into_values()
            .filter(|a| cid.as_deref().map(|c| a.course_id == c).unwrap_or(true))
            .collect())
    }

    /// Clamps the score into `[0, maxPoints]` at write time. `submittedAt`
    /// survives a regrade; `gradedAt` and the score always refresh.
    pub fn grade_assignment(
        &self,
        assignment_id: &str,
        student_id: &str,
        score: Option<f64>,
        feedback: Option<&str>,
    ) -> Result<Submission, StoreError> {
        let aid = canon(assignment_id);
        let sid = canon(student_id);
        let value = match score {
            Some(v) if v.is_finite() => v.trunc() as i64,
            _ => return rejected(Rejection::AssignmentStudentScoreRequired),
        };
        if aid.is_empty() || sid.is_empty() {
            return rejected(Rejection::AssignmentStudentScoreRequired);
        }
        let mut doc = self.load()?;
        let Some(assignment) = doc.assignments.get(&aid) else {
            return rejected(Rejection::AssignmentNotFound);
        };
        if !doc.users.contains_key(&sid) {
            return rejected(Rejection::StudentNotFound);
        }

        let max_points = coerce_max_points(Some(assignment.max_points as f64));
        let bounded = value.clamp(0, max_points);
        let submap = doc.submissions.entry(aid.clone()).or_default();
        let submitted_at = submap
            .get(&sid)
            .map(|s| s.submitted_at.clone())
            .unwrap_or_else(now_iso);

        let submission = Submission {
            student_id: sid.clone(),
            assignment_id: aid,
            score: bounded,
            max_points,
            feedback: feedback.unwrap_or("").to_string(),
            status: SubmissionStatus::Graded,
            submitted_at,
            graded_at: now_iso(),
        };
        submap.insert(sid, submission.clone());
        self.save(&doc)?;
        Ok(submission)
    }

    /// Scans enrollments for the student's courses and submissions for their
    /// graded work. Average is `round(100 * Σscore / ΣmaxPoints)`, 0 when no
    /// graded work exists.
    pub fn student_progress(&self, student_id: &str) -> Result<ProgressReport, StoreError> {
        let sid = canon(student_id);
        let doc = self.load()?;

        let courses: Vec<String> = doc
            .enrollments
            .iter()
            .filter(|(_, roster)| roster.iter().any(|s| canon(s) == sid))
            .map(|(cid, _)| cid.clone())
            .collect();

        let graded: Vec<&Submission> = doc
            .submissions
            .values()
            .filter_map(|submap| submap.get(&sid))
            .filter(|s| s.status == SubmissionStatus::Graded)
            .collect();

        let total_score: i64 = graded.iter().map(|s| s.score).sum();
        let total_max: i64 = graded.iter().map(|s| s.max_points).sum();
        let average_percent = if total_max > 0 {
            ((total_score as f64 / total_max as f64) * 100.0).round() as i64
        } else {
            0
        };

        Ok(ProgressReport {
            student_id: sid,
            courses,
            graded_count: graded.len(),
            average_percent,
        })
    }

    /// One-shot merge of the pre-store ambient keys. Only adds/updates user
    /// records, so replaying the same inputs is a no-op.
    pub fn import_legacy(&self, inputs: &LegacyInputs) -> Result<ImportSummary, StoreError> {
        let mut doc = self.load()?;
        let mut teachers_merged = 0usize;
        let mut roster_merged = 0usize;

        for teacher in &inputs.teachers {
            let key = canon(&teacher.id);
            if key.is_empty() {
                continue;
            }
            let role = if teacher.it_sensei {
                Role::ItSensei
            } else {
                Role::Sensei
            };
            let created_at = doc
                .users
                .get(&key)
                .map(|u| u.created_at.clone())
                .unwrap_or_else(now_iso);
            doc.users.insert(
                key.clone(),
                User {
                    id: key,
                    role,
                    user_type: "SENSEI".to_string(),
                    created_at,
                    updated_at: now_iso(),
                    active: true,
                },
            );
            teachers_merged += 1;
        }

        for id in &inputs.roster_ids {
            let key = canon(id);
            if key.is_empty() {
                continue;
            }
            let existing = doc.users.get(&key);
            let role = existing.map(|u| u.role).unwrap_or(Role::Student);
            let user_type = existing
                .map(|u| u.user_type.clone())
                .unwrap_or_else(|| "MEMBER".to_string());
            let created_at = existing
                .map(|u| u.created_at.clone())
                .unwrap_or_else(now_iso);
            doc.users.insert(
                key.clone(),
                User {
                    id: key,
                    role,
                    user_type,
                    created_at,
                    updated_at: now_iso(),
                    active: true,
                },
            );
            roster_merged += 1;
        }

        let session_user = inputs
            .session_user
            .as_deref()
            .map(canon)
            .filter(|u| !u.is_empty());
        let session_admin = inputs
            .session_role
            .as_deref()
            .map(canon)
            .map(|r| r == "ADMIN")
            .unwrap_or(false)
            || inputs
                .session_type
                .as_deref()
                .map(canon)
                .map(|t| t == "ADMIN")
                .unwrap_or(false);
        let admin_applied = match (session_user, session_admin) {
            (Some(name), true) => {
                let created_at = doc
                    .users
                    .get(&name)
                    .map(|u| u.created_at.clone())
                    .unwrap_or_else(now_iso);
                doc.users.insert(
                    name.clone(),
                    User {
                        id: name,
                        role: Role::Admin,
                        user_type: "ADMIN".to_string(),
                        created_at,
                        updated_at: now_iso(),
                        active: true,
                    },
                );
                true
            }
            _ => false,
        };

        self.save(&doc)?;
        log::debug!(
            "legacy import: {} teachers, {} roster entries, admin={}",
            teachers_merged,
            roster_merged,
            admin_applied
        );
        Ok(ImportSummary {
            teachers_merged,
            roster_merged,
            admin_applied,
            total_users: doc.users.len(),
        })
    }
}
