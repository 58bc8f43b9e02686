use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::exam::{ExamResult, ExamSession, ExamStatus, ExamSummary};
use crate::models::question::{Category, QuestionOption};
use crate::services::exam_service::{AssignedQuestion, DetailedAnswerRow, UserExamOverview};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SubmitAnswerRequest {
    #[validate(range(min = 1))]
    pub exam_question_id: i64,
    #[validate(range(min = 1))]
    pub question_option_id: i64,
}

/// An option as shown to the examinee. The score is deliberately absent:
/// sessions that are still live must not leak grading information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionResponse {
    pub id: i64,
    pub option_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignedQuestionResponse {
    pub exam_question_id: i64,
    pub question_id: i64,
    pub category: Category,
    pub order_number: i32,
    pub question_text: String,
    pub options: Vec<OptionResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryStatsResponse {
    pub category: Category,
    pub total_questions: i32,
    pub answered_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamSessionResponse {
    pub session_id: i64,
    pub user_id: String,
    pub session_code: String,
    pub status: ExamStatus,
    pub expires_at: DateTime<Utc>,
    pub duration_minutes: i32,
    pub questions: Vec<AssignedQuestionResponse>,
    pub category_stats: Vec<CategoryStatsResponse>,
}

impl ExamSessionResponse {
    /// Shapes a session and its assignments for the exam board. Options
    /// are grouped per question with scores stripped; category stats keep
    /// first-seen (assignment) order.
    pub fn project(
        session: &ExamSession,
        questions: &[AssignedQuestion],
        options: &[QuestionOption],
        answered_by_category: &HashMap<Category, i64>,
    ) -> Self {
        let mut options_by_question: HashMap<i64, Vec<OptionResponse>> = HashMap::new();
        for option in options {
            options_by_question
                .entry(option.question_id)
                .or_default()
                .push(OptionResponse {
                    id: option.id,
                    option_text: option.option_text.clone(),
                });
        }

        let mut stats: Vec<CategoryStatsResponse> = Vec::new();
        let question_responses = questions
            .iter()
            .map(|q| {
                match stats.iter_mut().find(|s| s.category == q.category) {
                    Some(entry) => entry.total_questions += 1,
                    None => stats.push(CategoryStatsResponse {
                        category: q.category,
                        total_questions: 1,
                        answered_count: answered_by_category
                            .get(&q.category)
                            .copied()
                            .unwrap_or(0),
                    }),
                }

                AssignedQuestionResponse {
                    exam_question_id: q.exam_question_id,
                    question_id: q.question_id,
                    category: q.category,
                    order_number: q.order_number,
                    question_text: q.question_text.clone(),
                    options: options_by_question
                        .remove(&q.question_id)
                        .unwrap_or_default(),
                }
            })
            .collect();

        Self {
            session_id: session.id,
            user_id: session.user_id.clone(),
            session_code: session.session_code.clone(),
            status: session.status,
            expires_at: session.expires_at,
            duration_minutes: session.duration_minutes,
            questions: question_responses,
            category_stats: stats,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartExamResponse {
    pub session_id: i64,
    pub status: ExamStatus,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitAnswerResponse {
    pub saved: bool,
    pub exam_question_id: i64,
    pub answered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamSummaryResponse {
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
}

impl From<ExamSummary> for ExamSummaryResponse {
    fn from(summary: ExamSummary) -> Self {
        Self {
            id: summary.id,
            exam_session_id: summary.exam_session_id,
            user_id: summary.user_id,
            total_questions: summary.total_questions,
            total_answered: summary.total_answered,
            total_score: summary.total_score,
            max_score: summary.max_score,
            overall_percentage: summary.overall_percentage,
            overall_grade: summary.overall_grade,
            is_passed: summary.is_passed,
            completed_at: summary.completed_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamResultResponse {
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
}

impl From<ExamResult> for ExamResultResponse {
    fn from(result: ExamResult) -> Self {
        Self {
            id: result.id,
            exam_session_id: result.exam_session_id,
            category: result.category,
            total_questions: result.total_questions,
            total_answered: result.total_answered,
            total_score: result.total_score,
            max_score: result.max_score,
            percentage: result.percentage,
            grade: result.grade,
            is_passed: result.is_passed,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamResultsResponse {
    pub summary: ExamSummaryResponse,
    pub results_by_category: Vec<ExamResultResponse>,
}

impl ExamResultsResponse {
    pub fn from_parts(summary: ExamSummary, results: Vec<ExamResult>) -> Self {
        Self {
            summary: summary.into(),
            results_by_category: results.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DetailedAnswerResponse {
    pub exam_question_id: i64,
    pub question_id: i64,
    pub question_text: String,
    pub selected_option: String,
    pub score: i32,
    pub max_score: i32,
    pub correct_option: String,
    pub is_correct: bool,
    pub answered_at: DateTime<Utc>,
}

/// Review payload for a completed exam, keyed by category. Answers keep
/// their display order within each category.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct DetailedAnswersResponse(pub HashMap<Category, Vec<DetailedAnswerResponse>>);

impl DetailedAnswersResponse {
    pub fn group(rows: Vec<DetailedAnswerRow>) -> Self {
        let mut by_category: HashMap<Category, Vec<DetailedAnswerResponse>> = HashMap::new();
        for row in rows {
            by_category
                .entry(row.category)
                .or_default()
                .push(DetailedAnswerResponse {
                    exam_question_id: row.exam_question_id,
                    question_id: row.question_id,
                    question_text: row.question_text,
                    selected_option: row.selected_option,
                    score: row.score,
                    max_score: row.max_score,
                    correct_option: row.correct_option,
                    is_correct: row.is_correct,
                    answered_at: row.answered_at,
                });
        }
        Self(by_category)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressInfoResponse {
    pub total_questions: i32,
    pub answered_questions: i64,
    pub remaining_minutes: i64,
}

/// Dashboard payload keyed by exam status; each variant carries only the
/// fields meaningful for that status.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "exam_status")]
pub enum DashboardResponse {
    #[serde(rename = "NO_EXAM")]
    NoExam { user_id: String, has_exam: bool },
    #[serde(rename = "NOT_STARTED")]
    NotStarted {
        user_id: String,
        has_exam: bool,
        session_code: String,
        progress: ProgressInfoResponse,
    },
    #[serde(rename = "IN_PROGRESS")]
    InProgress {
        user_id: String,
        has_exam: bool,
        session_code: String,
        progress: ProgressInfoResponse,
    },
    #[serde(rename = "COMPLETED")]
    Completed {
        user_id: String,
        has_exam: bool,
        session_code: String,
        results: ExamResultsResponse,
    },
    #[serde(rename = "EXPIRED")]
    Expired {
        user_id: String,
        has_exam: bool,
        session_code: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct AllUsersDashboardResponse {
    pub total_users: usize,
    pub users: Vec<UserExamOverview>,
}
