pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;

use crate::services::exam_rules::ExamRules;
use crate::services::{exam_service::ExamService, question_service::QuestionService};
use sqlx::PgPool;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub exam_service: ExamService,
    pub question_service: QuestionService,
}

impl AppState {
    pub fn new(pool: PgPool, rules: ExamRules) -> Self {
        let question_service = QuestionService::new(pool.clone());
        let exam_service = ExamService::new(pool.clone(), question_service.clone(), rules);

        Self {
            pool,
            exam_service,
            question_service,
        }
    }
}
