use crate::error::{Error, Result};
use crate::models::question::{Category, QuestionOption};
use rand::seq::SliceRandom;
use rand::Rng;
use sqlx::PgPool;

/// Read-only access to the question bank.
#[derive(Clone)]
pub struct QuestionService {
    pool: PgPool,
}

impl QuestionService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Draws `quota` distinct question ids from a category, uniformly at
    /// random. Fails with `InsufficientQuestions` when the bank is short.
    pub async fn random_sample(&self, category: Category, quota: usize) -> Result<Vec<i64>> {
        let mut ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM questions WHERE category = $1")
            .bind(category)
            .fetch_all(&self.pool)
            .await?;

        if ids.len() < quota {
            return Err(Error::InsufficientQuestions {
                category,
                needed: quota,
                available: ids.len(),
            });
        }

        Ok(draw(&mut ids, quota, &mut rand::thread_rng()))
    }

    /// All options for the questions assigned to a session, ordered by
    /// question then option id.
    pub async fn options_for_session(&self, exam_session_id: i64) -> Result<Vec<QuestionOption>> {
        let options = sqlx::query_as::<_, QuestionOption>(
            r#"
            SELECT o.id, o.question_id, o.option_text, o.score, o.created_at, o.updated_at
            FROM question_options o
            WHERE o.question_id IN (
                SELECT question_id FROM exam_questions WHERE exam_session_id = $1
            )
            ORDER BY o.question_id ASC, o.id ASC
            "#,
        )
        .bind(exam_session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(options)
    }
}

/// Shuffle-then-take draw of `n` ids without replacement. `ids` must hold
/// at least `n` entries.
fn draw<R: Rng + ?Sized>(ids: &mut Vec<i64>, n: usize, rng: &mut R) -> Vec<i64> {
    ids.shuffle(rng);
    ids[..n].to_vec()
}
