use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::question::Category;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "exam_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExamStatus {
    NotStarted,
    InProgress,
    Completed,
    Expired,
}

/// One exam attempt by one user. At most one session per user may be in
/// NOT_STARTED or IN_PROGRESS at a time; the engine enforces this when
/// fetching/creating, not the schema.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExamSession {
    pub id: i64,
    pub user_id: String,
    pub session_code: String,
    pub status: ExamStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub duration_minutes: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A question assigned to a session. Category is copied from the question
/// at assignment time so later edits to the bank cannot skew results.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExamQuestion {
    pub id: i64,
    pub exam_session_id: i64,
    pub question_id: i64,
    pub category: Category,
    pub order_number: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserAnswer {
    pub id: i64,
    pub exam_session_id: i64,
    pub exam_question_id: i64,
    pub question_id: i64,
    pub question_option_id: i64,
    pub score: i32,
    pub answered_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-category grading outcome, written once at completion.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExamResult {
    pub id: i64,
    pub exam_session_id: i64,
    pub category: Category,
    pub total_questions: i32,
    pub total_answered: i32,
    pub total_score: i32,
    pub max_score: i32,
    pub percentage: f64,
    pub grade: String,
    pub is_passed: bool,
    pub created_at: DateTime<Utc>,
}

/// Overall grading outcome across all categories, written once at
/// completion.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExamSummary {
    pub id: i64,
    pub exam_session_id: i64,
    pub user_id: String,
    pub total_questions: i32,
    pub total_answered: i32,
    pub total_score: i32,
    pub max_score: i32,
    pub overall_percentage: f64,
    pub overall_grade: String,
    pub is_passed: bool,
    pub completed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}
