use axum::{
    extract::{Path, State},
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use validator::Validate;

use crate::dto::exam_dto::{
    AllUsersDashboardResponse, DashboardResponse, DetailedAnswersResponse, ExamResultsResponse,
    ExamSessionResponse, ProgressInfoResponse, StartExamResponse, SubmitAnswerRequest,
    SubmitAnswerResponse,
};
use crate::models::exam::{ExamSession, ExamStatus};
use crate::AppState;

/// Returns the user's active session, creating a fresh randomized one
/// when none exists.
#[axum::debug_handler]
pub async fn get_or_create_exam(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> crate::error::Result<Response> {
    let session = state.exam_service.get_or_create_session(&user_id).await?;
    let response = project_session(&state, &session).await?;
    Ok(Json(response).into_response())
}

#[axum::debug_handler]
pub async fn start_exam(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> crate::error::Result<Response> {
    let session = state.exam_service.get_active_session(&user_id).await?;
    let updated = state.exam_service.start_exam(session.id).await?;

    let response = StartExamResponse {
        session_id: updated.id,
        status: updated.status,
        started_at: updated.started_at.unwrap_or_else(Utc::now),
        expires_at: updated.expires_at,
    };
    Ok(Json(response).into_response())
}

#[axum::debug_handler]
pub async fn submit_answer(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(req): Json<SubmitAnswerRequest>,
) -> crate::error::Result<Response> {
    req.validate()?;
    let session = state.exam_service.get_active_session(&user_id).await?;
    let answer = state
        .exam_service
        .submit_answer(session.id, req.exam_question_id, req.question_option_id)
        .await?;

    Ok(Json(SubmitAnswerResponse {
        saved: true,
        exam_question_id: answer.exam_question_id,
        answered_at: answer.answered_at,
    })
    .into_response())
}

#[axum::debug_handler]
pub async fn complete_exam(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> crate::error::Result<Response> {
    let session = state.exam_service.get_active_session(&user_id).await?;
    let summary = state.exam_service.complete_exam(session.id).await?;
    let results = state
        .exam_service
        .results_for_session(summary.exam_session_id)
        .await?;

    Ok(Json(ExamResultsResponse::from_parts(summary, results)).into_response())
}

#[axum::debug_handler]
pub async fn get_results(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> crate::error::Result<Response> {
    let (summary, results) = state.exam_service.get_exam_results(&user_id).await?;
    Ok(Json(ExamResultsResponse::from_parts(summary, results)).into_response())
}

/// Existing answers for the active session, keyed by exam question id.
/// The exam board uses this to repopulate selections after a reload.
#[axum::debug_handler]
pub async fn get_answers(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> crate::error::Result<Response> {
    let session = state.exam_service.get_active_session(&user_id).await?;
    let answers = state.exam_service.answers_by_question(session.id).await?;
    Ok(Json(answers).into_response())
}

/// Answer-by-answer review of the latest completed exam, grouped by
/// category. 404 until the user has completed one.
#[axum::debug_handler]
pub async fn get_detailed_answers(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> crate::error::Result<Response> {
    let rows = state.exam_service.detailed_answers(&user_id).await?;
    Ok(Json(DetailedAnswersResponse::group(rows)).into_response())
}

#[axum::debug_handler]
pub async fn get_dashboard(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> crate::error::Result<Response> {
    let Some(session) = state.exam_service.latest_session(&user_id).await? else {
        return Ok(Json(DashboardResponse::NoExam {
            user_id,
            has_exam: false,
        })
        .into_response());
    };

    let dashboard = match session.status {
        ExamStatus::NotStarted => DashboardResponse::NotStarted {
            user_id,
            has_exam: true,
            session_code: session.session_code.clone(),
            progress: progress_info(&state, &session).await?,
        },
        ExamStatus::InProgress => DashboardResponse::InProgress {
            user_id,
            has_exam: true,
            session_code: session.session_code.clone(),
            progress: progress_info(&state, &session).await?,
        },
        ExamStatus::Completed => {
            let (summary, results) = state.exam_service.get_exam_results(&user_id).await?;
            DashboardResponse::Completed {
                user_id,
                has_exam: true,
                session_code: session.session_code.clone(),
                results: ExamResultsResponse::from_parts(summary, results),
            }
        }
        ExamStatus::Expired => DashboardResponse::Expired {
            user_id,
            has_exam: true,
            session_code: session.session_code.clone(),
        },
    };

    Ok(Json(dashboard).into_response())
}

#[axum::debug_handler]
pub async fn all_users_dashboard(
    State(state): State<AppState>,
) -> crate::error::Result<Response> {
    let users = state.exam_service.all_users_overview().await?;
    Ok(Json(AllUsersDashboardResponse {
        total_users: users.len(),
        users,
    })
    .into_response())
}

async fn project_session(
    state: &AppState,
    session: &ExamSession,
) -> crate::error::Result<ExamSessionResponse> {
    let questions = state.exam_service.session_questions(session.id).await?;
    let options = state.question_service.options_for_session(session.id).await?;
    let answered = state.exam_service.answered_per_category(session.id).await?;
    Ok(ExamSessionResponse::project(
        session, &questions, &options, &answered,
    ))
}

async fn progress_info(
    state: &AppState,
    session: &ExamSession,
) -> crate::error::Result<ProgressInfoResponse> {
    let answered = state.exam_service.answered_count(session.id).await?;
    Ok(ProgressInfoResponse {
        total_questions: state.exam_service.rules().total_questions(),
        answered_questions: answered,
        remaining_minutes: (session.expires_at - Utc::now()).num_minutes(),
    })
}
