use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Fixed exam categories, in official ordering. Each category carries its
/// own question quota and grading weight (see `services::exam_rules`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "question_category")]
pub enum Category {
    #[sqlx(rename = "TEKNIS")]
    #[serde(rename = "TEKNIS")]
    Teknis,
    #[sqlx(rename = "MANAJERIAL")]
    #[serde(rename = "MANAJERIAL")]
    Manajerial,
    #[sqlx(rename = "SOSIAL KULTURAL")]
    #[serde(rename = "SOSIAL KULTURAL")]
    SosialKultural,
    #[sqlx(rename = "WAWANCARA")]
    #[serde(rename = "WAWANCARA")]
    Wawancara,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Teknis => "TEKNIS",
            Category::Manajerial => "MANAJERIAL",
            Category::SosialKultural => "SOSIAL KULTURAL",
            Category::Wawancara => "WAWANCARA",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Question {
    pub id: i64,
    pub category: Category,
    pub question_text: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An answer option. `score` is the points awarded when the option is
/// chosen (0..10); answers snapshot it at submission time.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct QuestionOption {
    pub id: i64,
    pub question_id: i64,
    pub option_text: String,
    pub score: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
