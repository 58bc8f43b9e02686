use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};

use crate::error::{Error, Result};
use crate::models::exam::{ExamQuestion, ExamResult, ExamSession, ExamStatus, ExamSummary, UserAnswer};
use crate::models::question::{Category, QuestionOption};
use crate::services::exam_rules::{grade_for, ExamRules};
use crate::services::question_service::QuestionService;

/// An assigned question joined with its text, in display order.
#[derive(Debug, Clone, FromRow)]
pub struct AssignedQuestion {
    pub exam_question_id: i64,
    pub question_id: i64,
    pub category: Category,
    pub order_number: i32,
    pub question_text: String,
}

/// One answered question of a completed exam, joined with its text, the
/// chosen option and the best-scoring option, for the results review.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DetailedAnswerRow {
    pub category: Category,
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

/// Latest session per user joined with its summary, for the reporting
/// view. Summary columns are NULL until the session completes.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct UserExamOverview {
    pub user_id: String,
    pub exam_status: ExamStatus,
    pub session_code: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_score: Option<i32>,
    pub max_score: Option<i32>,
    pub overall_percentage: Option<f64>,
    pub overall_grade: Option<String>,
    pub is_passed: Option<bool>,
}

/// The exam session state machine and scoring engine.
///
/// Every multi-step operation (creation, answer submission, completion)
/// runs in a single database transaction; a failure rolls the whole
/// operation back. The one exception is the lazy expiry flip inside
/// `submit_answer`, which commits before the submission error surfaces.
#[derive(Clone)]
pub struct ExamService {
    pool: PgPool,
    questions: QuestionService,
    rules: ExamRules,
}

impl ExamService {
    pub fn new(pool: PgPool, questions: QuestionService, rules: ExamRules) -> Self {
        Self {
            pool,
            questions,
            rules,
        }
    }

    pub fn rules(&self) -> &ExamRules {
        &self.rules
    }

    /// Creates a session with NOT_STARTED status and assigns the full
    /// randomized question set: each category's quota is drawn without
    /// replacement and numbered sequentially, category by category, in
    /// the configured order.
    ///
    /// Sampling happens before the transaction opens, so a short bank
    /// (`InsufficientQuestions`) leaves no rows behind.
    pub async fn create_exam_session(&self, user_id: &str) -> Result<ExamSession> {
        if user_id.trim().is_empty() {
            return Err(Error::BadRequest("user id must not be empty".to_string()));
        }

        let mut assignments: Vec<(Category, Vec<i64>)> =
            Vec::with_capacity(self.rules.categories.len());
        for rule in &self.rules.categories {
            let ids = self
                .questions
                .random_sample(rule.category, rule.quota as usize)
                .await?;
            assignments.push((rule.category, ids));
        }

        let now = Utc::now();
        // Uniqueness rides on timestamp granularity; two creations for the
        // same user within one second collide on the unique index.
        let session_code = format!("EXAM_{}_{}", user_id, now.timestamp());
        let expires_at = now + Duration::minutes(self.rules.duration_minutes as i64);

        let mut tx = self.pool.begin().await?;

        let session = sqlx::query_as::<_, ExamSession>(
            r#"
            INSERT INTO exam_sessions (user_id, session_code, status, expires_at, duration_minutes)
            VALUES ($1, $2, 'NOT_STARTED', $3, $4)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(&session_code)
        .bind(expires_at)
        .bind(self.rules.duration_minutes)
        .fetch_one(&mut *tx)
        .await?;

        let mut order_number = 1i32;
        for (category, question_ids) in assignments {
            for question_id in question_ids {
                sqlx::query(
                    r#"
                    INSERT INTO exam_questions (exam_session_id, question_id, category, order_number)
                    VALUES ($1, $2, $3, $4)
                    "#,
                )
                .bind(session.id)
                .bind(question_id)
                .bind(category)
                .bind(order_number)
                .execute(&mut *tx)
                .await?;
                order_number += 1;
            }
        }

        tx.commit().await?;

        tracing::info!(
            user_id,
            %session_code,
            questions = order_number - 1,
            "exam session created"
        );
        Ok(session)
    }

    /// Bulk-expires every active session whose expiry has passed. Invoked
    /// inline before any status-sensitive read; there is no background
    /// scheduler.
    pub async fn expire_overdue_sessions(&self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE exam_sessions
            SET status = 'EXPIRED', updated_at = NOW()
            WHERE expires_at < NOW() AND status IN ('NOT_STARTED', 'IN_PROGRESS')
            "#,
        )
        .execute(&self.pool)
        .await?;

        let expired = result.rows_affected();
        if expired > 0 {
            tracing::info!(expired, "swept overdue exam sessions");
        }
        Ok(expired)
    }

    /// Most recent NOT_STARTED/IN_PROGRESS session for a user, after the
    /// expiry sweep. `SessionNotFound` is the normal "no active session"
    /// answer callers use to decide whether to create one.
    pub async fn get_active_session(&self, user_id: &str) -> Result<ExamSession> {
        self.expire_overdue_sessions().await?;

        sqlx::query_as::<_, ExamSession>(
            r#"
            SELECT * FROM exam_sessions
            WHERE user_id = $1 AND status IN ('NOT_STARTED', 'IN_PROGRESS')
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(Error::SessionNotFound)
    }

    pub async fn get_or_create_session(&self, user_id: &str) -> Result<ExamSession> {
        match self.get_active_session(user_id).await {
            Ok(session) => Ok(session),
            Err(Error::SessionNotFound) => self.create_exam_session(user_id).await,
            Err(e) => Err(e),
        }
    }

    /// Most recent session for a user regardless of status, after the
    /// expiry sweep.
    pub async fn latest_session(&self, user_id: &str) -> Result<Option<ExamSession>> {
        self.expire_overdue_sessions().await?;

        let session = sqlx::query_as::<_, ExamSession>(
            "SELECT * FROM exam_sessions WHERE user_id = $1 ORDER BY created_at DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    /// Moves a session to IN_PROGRESS. A repeated start keeps the original
    /// started_at; sessions already terminal are not touched.
    pub async fn start_exam(&self, session_id: i64) -> Result<ExamSession> {
        sqlx::query_as::<_, ExamSession>(
            r#"
            UPDATE exam_sessions
            SET status = 'IN_PROGRESS', started_at = COALESCE(started_at, $1), updated_at = NOW()
            WHERE id = $2 AND status IN ('NOT_STARTED', 'IN_PROGRESS')
            RETURNING *
            "#,
        )
        .bind(Utc::now())
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(Error::SessionNotFound)
    }

    /// Records (or re-records) an answer. Preconditions are checked in a
    /// fixed order, each with its own failure; on success the option's
    /// current score is snapshotted into the answer row.
    pub async fn submit_answer(
        &self,
        session_id: i64,
        exam_question_id: i64,
        option_id: i64,
    ) -> Result<UserAnswer> {
        let mut tx = self.pool.begin().await?;

        let session = sqlx::query_as::<_, ExamSession>("SELECT * FROM exam_sessions WHERE id = $1")
            .bind(session_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(Error::SessionNotFound)?;

        match session.status {
            ExamStatus::Completed => return Err(Error::ExamAlreadyCompleted),
            ExamStatus::Expired => return Err(Error::ExamExpired),
            ExamStatus::NotStarted => return Err(Error::ExamNotStarted),
            ExamStatus::InProgress => {}
        }

        if Utc::now() > session.expires_at {
            sqlx::query("UPDATE exam_sessions SET status = 'EXPIRED', updated_at = NOW() WHERE id = $1")
                .bind(session_id)
                .execute(&mut *tx)
                .await?;
            // The status flip must stick even though the submission fails.
            tx.commit().await?;
            tracing::warn!(session_id, "answer rejected, session expired mid-exam");
            return Err(Error::ExamExpired);
        }

        let option =
            sqlx::query_as::<_, QuestionOption>("SELECT * FROM question_options WHERE id = $1")
                .bind(option_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(Error::OptionNotFound)?;

        let exam_question = sqlx::query_as::<_, ExamQuestion>(
            "SELECT * FROM exam_questions WHERE id = $1 AND exam_session_id = $2",
        )
        .bind(exam_question_id)
        .bind(session_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(Error::QuestionNotInSession)?;

        if option.question_id != exam_question.question_id {
            return Err(Error::OptionNotFound);
        }

        let now = Utc::now();
        let existing = sqlx::query_as::<_, UserAnswer>(
            "SELECT * FROM user_answers WHERE exam_session_id = $1 AND exam_question_id = $2",
        )
        .bind(session_id)
        .bind(exam_question_id)
        .fetch_optional(&mut *tx)
        .await?;

        let answer = match existing {
            Some(previous) => {
                sqlx::query_as::<_, UserAnswer>(
                    r#"
                    UPDATE user_answers
                    SET question_option_id = $1, score = $2, answered_at = $3, updated_at = NOW()
                    WHERE id = $4
                    RETURNING *
                    "#,
                )
                .bind(option_id)
                .bind(option.score)
                .bind(now)
                .bind(previous.id)
                .fetch_one(&mut *tx)
                .await?
            }
            None => {
                sqlx::query_as::<_, UserAnswer>(
                    r#"
                    INSERT INTO user_answers
                        (exam_session_id, exam_question_id, question_id, question_option_id, score, answered_at)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    RETURNING *
                    "#,
                )
                .bind(session_id)
                .bind(exam_question_id)
                .bind(exam_question.question_id)
                .bind(option_id)
                .bind(option.score)
                .bind(now)
                .fetch_one(&mut *tx)
                .await?
            }
        };

        tx.commit().await?;
        Ok(answer)
    }

    /// Completes a session and computes all results in one transaction:
    /// per-category counts and score sums via a join against the
    /// assignments, percentage against the configured category maximum,
    /// shared grade bands, then one summary row across all categories.
    /// A session that has already completed is rejected.
    pub async fn complete_exam(&self, session_id: i64) -> Result<ExamSummary> {
        let mut tx = self.pool.begin().await?;

        let session = sqlx::query_as::<_, ExamSession>("SELECT * FROM exam_sessions WHERE id = $1")
            .bind(session_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(Error::SessionNotFound)?;

        if session.status == ExamStatus::Completed {
            return Err(Error::ExamAlreadyCompleted);
        }

        let now = Utc::now();
        sqlx::query(
            "UPDATE exam_sessions SET status = 'COMPLETED', completed_at = $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(now)
        .bind(session_id)
        .execute(&mut *tx)
        .await?;

        let mut total_score = 0i64;
        let mut total_answered = 0i64;

        for rule in &self.rules.categories {
            let (answered, score): (i64, i64) = sqlx::query_as(
                r#"
                SELECT COUNT(ua.id), COALESCE(SUM(ua.score), 0)
                FROM user_answers ua
                JOIN exam_questions eq ON eq.id = ua.exam_question_id
                WHERE ua.exam_session_id = $1 AND eq.category = $2
                "#,
            )
            .bind(session_id)
            .bind(rule.category)
            .fetch_one(&mut *tx)
            .await?;

            let percentage = score as f64 / rule.max_score as f64 * 100.0;
            let grade = grade_for(percentage);
            let is_passed = percentage >= rule.pass_threshold;

            sqlx::query(
                r#"
                INSERT INTO exam_results
                    (exam_session_id, category, total_questions, total_answered,
                     total_score, max_score, percentage, grade, is_passed)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(session_id)
            .bind(rule.category)
            .bind(rule.quota)
            .bind(answered as i32)
            .bind(score as i32)
            .bind(rule.max_score)
            .bind(percentage)
            .bind(grade)
            .bind(is_passed)
            .execute(&mut *tx)
            .await?;

            total_score += score;
            total_answered += answered;
        }

        let overall_percentage =
            total_score as f64 / self.rules.overall_max_score as f64 * 100.0;
        let overall_grade = grade_for(overall_percentage);
        let overall_passed = overall_percentage >= self.rules.overall_pass_threshold;

        let summary = sqlx::query_as::<_, ExamSummary>(
            r#"
            INSERT INTO exam_summaries
                (exam_session_id, user_id, total_questions, total_answered,
                 total_score, max_score, overall_percentage, overall_grade, is_passed, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(session_id)
        .bind(&session.user_id)
        .bind(self.rules.total_questions())
        .bind(total_answered as i32)
        .bind(total_score as i32)
        .bind(self.rules.overall_max_score)
        .bind(overall_percentage)
        .bind(overall_grade)
        .bind(overall_passed)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            session_id,
            user_id = %session.user_id,
            overall_percentage,
            overall_grade,
            passed = overall_passed,
            "exam completed"
        );
        Ok(summary)
    }

    /// Latest summary for a user plus its per-category rows, ordered by
    /// category name. Pure read.
    pub async fn get_exam_results(&self, user_id: &str) -> Result<(ExamSummary, Vec<ExamResult>)> {
        let summary = sqlx::query_as::<_, ExamSummary>(
            "SELECT * FROM exam_summaries WHERE user_id = $1 ORDER BY completed_at DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(Error::ResultsNotFound)?;

        let results = self.results_for_session(summary.exam_session_id).await?;
        Ok((summary, results))
    }

    /// Answer-by-answer review of the user's latest completed exam: each
    /// answered question with its text, the chosen option and the
    /// best-scoring option, in display order. `ResultsNotFound` when the
    /// user has no completed session.
    pub async fn detailed_answers(&self, user_id: &str) -> Result<Vec<DetailedAnswerRow>> {
        let session = sqlx::query_as::<_, ExamSession>(
            r#"
            SELECT * FROM exam_sessions
            WHERE user_id = $1 AND status = 'COMPLETED'
            ORDER BY completed_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(Error::ResultsNotFound)?;

        let rows = sqlx::query_as::<_, DetailedAnswerRow>(
            r#"
            SELECT eq.category, ua.exam_question_id, ua.question_id,
                   q.question_text,
                   chosen.option_text AS selected_option,
                   ua.score,
                   best.score AS max_score,
                   best.option_text AS correct_option,
                   (ua.score >= best.score) AS is_correct,
                   ua.answered_at
            FROM user_answers ua
            JOIN exam_questions eq ON eq.id = ua.exam_question_id
            JOIN questions q ON q.id = ua.question_id
            JOIN question_options chosen ON chosen.id = ua.question_option_id
            JOIN LATERAL (
                SELECT option_text, score FROM question_options
                WHERE question_id = ua.question_id
                ORDER BY score DESC, id ASC
                LIMIT 1
            ) best ON TRUE
            WHERE ua.exam_session_id = $1
            ORDER BY eq.order_number ASC
            "#,
        )
        .bind(session.id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn results_for_session(&self, session_id: i64) -> Result<Vec<ExamResult>> {
        let results = sqlx::query_as::<_, ExamResult>(
            "SELECT * FROM exam_results WHERE exam_session_id = $1 ORDER BY category::text ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(results)
    }

    /// Assigned questions with their text, in display order.
    pub async fn session_questions(&self, session_id: i64) -> Result<Vec<AssignedQuestion>> {
        let questions = sqlx::query_as::<_, AssignedQuestion>(
            r#"
            SELECT eq.id AS exam_question_id, eq.question_id, eq.category,
                   eq.order_number, q.question_text
            FROM exam_questions eq
            JOIN questions q ON q.id = eq.question_id
            WHERE eq.exam_session_id = $1
            ORDER BY eq.order_number ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(questions)
    }

    pub async fn answered_count(&self, session_id: i64) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM user_answers WHERE exam_session_id = $1")
                .bind(session_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    pub async fn answered_per_category(&self, session_id: i64) -> Result<HashMap<Category, i64>> {
        let rows: Vec<(Category, i64)> = sqlx::query_as(
            r#"
            SELECT eq.category, COUNT(ua.id)
            FROM exam_questions eq
            LEFT JOIN user_answers ua ON ua.exam_question_id = eq.id
            WHERE eq.exam_session_id = $1
            GROUP BY eq.category
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }

    /// Existing answers for a session as an exam_question -> option map,
    /// used to repopulate the exam board on reload.
    pub async fn answers_by_question(&self, session_id: i64) -> Result<HashMap<i64, i64>> {
        let rows: Vec<(i64, i64)> = sqlx::query_as(
            "SELECT exam_question_id, question_option_id FROM user_answers WHERE exam_session_id = $1",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }

    /// Reporting view: each user's latest session left-joined with its
    /// summary. Runs the expiry sweep first.
    pub async fn all_users_overview(&self) -> Result<Vec<UserExamOverview>> {
        self.expire_overdue_sessions().await?;

        let rows = sqlx::query_as::<_, UserExamOverview>(
            r#"
            SELECT es.user_id, es.status AS exam_status, es.session_code,
                   es.started_at, es.completed_at,
                   s.total_score, s.max_score, s.overall_percentage,
                   s.overall_grade, s.is_passed
            FROM exam_sessions es
            LEFT JOIN exam_summaries s ON s.exam_session_id = es.id
            WHERE es.id IN (SELECT MAX(id) FROM exam_sessions GROUP BY user_id)
            ORDER BY es.created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
