use std::env;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value as JsonValue};
use sqlx::PgPool;
use tower::ServiceExt;

use exam_backend::error::Error;
use exam_backend::models::question::Category;
use exam_backend::services::exam_rules::{CategoryRule, ExamRules};
use exam_backend::AppState;

/// Small bank layout so tests stay fast: 8 questions per session, best
/// option on every question scores the category maximum exactly.
fn test_rules() -> ExamRules {
    ExamRules {
        categories: vec![
            CategoryRule {
                category: Category::Teknis,
                quota: 3,
                max_score: 12,
                pass_threshold: 90.0,
            },
            CategoryRule {
                category: Category::Manajerial,
                quota: 2,
                max_score: 8,
                pass_threshold: 90.0,
            },
            CategoryRule {
                category: Category::SosialKultural,
                quota: 2,
                max_score: 8,
                pass_threshold: 90.0,
            },
            CategoryRule {
                category: Category::Wawancara,
                quota: 1,
                max_score: 4,
                pass_threshold: 90.0,
            },
        ],
        duration_minutes: 30,
        overall_max_score: 32,
        overall_pass_threshold: 90.0,
    }
}

async fn setup(rules: ExamRules) -> (Router, AppState, PgPool) {
    dotenvy::dotenv().ok();
    env::set_var("SERVER_ADDRESS", "127.0.0.1:0");
    let _ = exam_backend::config::init_config();

    let pool = exam_backend::database::pool::create_pool()
        .await
        .expect("pool");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations");

    seed_questions(&pool).await;

    let state = AppState::new(pool.clone(), rules);
    let app = Router::new()
        .route("/api/v1/exam/:user_id", get(exam_backend::routes::exam::get_or_create_exam))
        .route(
            "/api/v1/exam/:user_id/start",
            post(exam_backend::routes::exam::start_exam),
        )
        .route(
            "/api/v1/exam/:user_id/answer",
            post(exam_backend::routes::exam::submit_answer),
        )
        .route(
            "/api/v1/exam/:user_id/complete",
            post(exam_backend::routes::exam::complete_exam),
        )
        .route(
            "/api/v1/exam/:user_id/results",
            get(exam_backend::routes::exam::get_results),
        )
        .route(
            "/api/v1/exam/:user_id/detailed-answers",
            get(exam_backend::routes::exam::get_detailed_answers),
        )
        .route(
            "/api/v1/exam/:user_id/dashboard",
            get(exam_backend::routes::exam::get_dashboard),
        )
        .route(
            "/api/v1/dashboard/users",
            get(exam_backend::routes::exam::all_users_dashboard),
        )
        .with_state(state.clone());

    (app, state, pool)
}

/// Five questions per category, four options each scored 1 to 4.
async fn seed_questions(pool: &PgPool) {
    for category in [
        Category::Teknis,
        Category::Manajerial,
        Category::SosialKultural,
        Category::Wawancara,
    ] {
        for n in 0..5 {
            let question_id: i64 = sqlx::query_scalar(
                "INSERT INTO questions (category, question_text) VALUES ($1, $2) RETURNING id",
            )
            .bind(category)
            .bind(format!("Seed question {} for {}", n, category))
            .fetch_one(pool)
            .await
            .expect("seed question");

            for score in 1..=4 {
                sqlx::query(
                    "INSERT INTO question_options (question_id, option_text, score) VALUES ($1, $2, $3)",
                )
                .bind(question_id)
                .bind(format!("Option worth {}", score))
                .bind(score)
                .execute(pool)
                .await
                .expect("seed option");
            }
        }
    }
}

fn unique_user() -> String {
    format!("user_{}", rand::random::<u32>())
}

async fn best_option_id(pool: &PgPool, question_id: i64) -> i64 {
    sqlx::query_scalar(
        "SELECT id FROM question_options WHERE question_id = $1 ORDER BY score DESC, id ASC LIMIT 1",
    )
    .bind(question_id)
    .fetch_one(pool)
    .await
    .expect("best option")
}

async fn worst_option_id(pool: &PgPool, question_id: i64) -> i64 {
    sqlx::query_scalar(
        "SELECT id FROM question_options WHERE question_id = $1 ORDER BY score ASC, id ASC LIMIT 1",
    )
    .bind(question_id)
    .fetch_one(pool)
    .await
    .expect("worst option")
}

async fn json_body(resp: axum::response::Response) -> JsonValue {
    let bytes = to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn dashboard_reports_no_exam_for_unknown_user() {
    let (app, _state, _pool) = setup(test_rules()).await;
    let user_id = unique_user();

    let req = Request::builder()
        .method("GET")
        .uri(format!("/api/v1/exam/{}/dashboard", user_id))
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = json_body(resp).await;
    assert_eq!(body["exam_status"], "NO_EXAM");
    assert_eq!(body["has_exam"], false);
    assert_eq!(body["user_id"], user_id.as_str());
}

#[tokio::test]
async fn exam_flow_end_to_end() {
    let (app, state, pool) = setup(test_rules()).await;
    let user_id = unique_user();

    let req = Request::builder()
        .method("GET")
        .uri(format!("/api/v1/exam/{}", user_id))
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let session = json_body(resp).await;

    let session_id = session["session_id"].as_i64().unwrap();
    assert_eq!(session["status"], "NOT_STARTED");
    assert!(session["session_code"]
        .as_str()
        .unwrap()
        .starts_with(&format!("EXAM_{}_", user_id)));

    let questions = session["questions"].as_array().unwrap();
    assert_eq!(questions.len(), 8);
    let expected_categories = [
        "TEKNIS",
        "TEKNIS",
        "TEKNIS",
        "MANAJERIAL",
        "MANAJERIAL",
        "SOSIAL KULTURAL",
        "SOSIAL KULTURAL",
        "WAWANCARA",
    ];
    for (i, q) in questions.iter().enumerate() {
        assert_eq!(q["order_number"].as_i64().unwrap(), i as i64 + 1);
        assert_eq!(q["category"], expected_categories[i]);
        assert_eq!(q["options"].as_array().unwrap().len(), 4);
    }

    // Answering before starting is rejected.
    let first_eq = questions[0]["exam_question_id"].as_i64().unwrap();
    let first_qid = questions[0]["question_id"].as_i64().unwrap();
    let worst = worst_option_id(&pool, first_qid).await;
    let req = Request::builder()
        .method("POST")
        .uri(format!("/api/v1/exam/{}/answer", user_id))
        .header("content-type", "application/json")
        .body(Body::from(
            json!({"exam_question_id": first_eq, "question_option_id": worst}).to_string(),
        ))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let req = Request::builder()
        .method("POST")
        .uri(format!("/api/v1/exam/{}/start", user_id))
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let started = json_body(resp).await;
    assert_eq!(started["status"], "IN_PROGRESS");

    // First pass answers the worst option, second pass overwrites with the
    // best; the upsert must leave exactly one row per question.
    let req = Request::builder()
        .method("POST")
        .uri(format!("/api/v1/exam/{}/answer", user_id))
        .header("content-type", "application/json")
        .body(Body::from(
            json!({"exam_question_id": first_eq, "question_option_id": worst}).to_string(),
        ))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    for q in questions {
        let eq_id = q["exam_question_id"].as_i64().unwrap();
        let qid = q["question_id"].as_i64().unwrap();
        let best = best_option_id(&pool, qid).await;
        let req = Request::builder()
            .method("POST")
            .uri(format!("/api/v1/exam/{}/answer", user_id))
            .header("content-type", "application/json")
            .body(Body::from(
                json!({"exam_question_id": eq_id, "question_option_id": best}).to_string(),
            ))
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["saved"], true);
    }

    let answer_rows: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM user_answers WHERE exam_session_id = $1")
            .bind(session_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(answer_rows, 8);

    // Mismatched option for a question in the session is rejected.
    let other_qid = questions[1]["question_id"].as_i64().unwrap();
    let foreign_option = best_option_id(&pool, other_qid).await;
    let req = Request::builder()
        .method("POST")
        .uri(format!("/api/v1/exam/{}/answer", user_id))
        .header("content-type", "application/json")
        .body(Body::from(
            json!({"exam_question_id": first_eq, "question_option_id": foreign_option}).to_string(),
        ))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    // No review before the exam completes.
    let req = Request::builder()
        .method("GET")
        .uri(format!("/api/v1/exam/{}/detailed-answers", user_id))
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let req = Request::builder()
        .method("POST")
        .uri(format!("/api/v1/exam/{}/complete", user_id))
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let completed = json_body(resp).await;

    let summary = &completed["summary"];
    assert_eq!(summary["total_answered"].as_i64().unwrap(), 8);
    assert_eq!(summary["total_score"].as_i64().unwrap(), 32);
    assert_eq!(summary["overall_percentage"].as_f64().unwrap(), 100.0);
    assert_eq!(summary["overall_grade"], "A");
    assert_eq!(summary["is_passed"], true);

    let results = completed["results_by_category"].as_array().unwrap();
    assert_eq!(results.len(), 4);
    let ordered: Vec<&str> = results
        .iter()
        .map(|r| r["category"].as_str().unwrap())
        .collect();
    assert_eq!(
        ordered,
        ["MANAJERIAL", "SOSIAL KULTURAL", "TEKNIS", "WAWANCARA"]
    );
    for r in results {
        assert_eq!(r["percentage"].as_f64().unwrap(), 100.0);
        assert_eq!(r["grade"], "A");
        assert_eq!(r["is_passed"], true);
    }

    // A completed session takes no further answers.
    let best = best_option_id(&pool, first_qid).await;
    let err = state
        .exam_service
        .submit_answer(session_id, first_eq, best)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ExamAlreadyCompleted));

    let req = Request::builder()
        .method("GET")
        .uri(format!("/api/v1/exam/{}/results", user_id))
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let req = Request::builder()
        .method("GET")
        .uri(format!("/api/v1/exam/{}/detailed-answers", user_id))
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let review = json_body(resp).await;
    let by_category = review.as_object().unwrap();
    assert_eq!(by_category.len(), 4);
    let teknis = review["TEKNIS"].as_array().unwrap();
    assert_eq!(teknis.len(), 3);
    assert_eq!(review["SOSIAL KULTURAL"].as_array().unwrap().len(), 2);
    for answers in by_category.values() {
        for a in answers.as_array().unwrap() {
            assert_eq!(a["is_correct"], true);
            assert_eq!(a["score"], a["max_score"]);
            assert_eq!(a["selected_option"], a["correct_option"]);
            assert!(a["question_text"].as_str().unwrap().starts_with("Seed question"));
        }
    }

    let req = Request::builder()
        .method("GET")
        .uri(format!("/api/v1/exam/{}/dashboard", user_id))
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let dashboard = json_body(resp).await;
    assert_eq!(dashboard["exam_status"], "COMPLETED");
    assert_eq!(
        dashboard["results"]["summary"]["overall_grade"],
        "A"
    );

    let req = Request::builder()
        .method("GET")
        .uri("/api/v1/dashboard/users")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let all_users = json_body(resp).await;
    let me = all_users["users"]
        .as_array()
        .unwrap()
        .iter()
        .find(|u| u["user_id"] == user_id.as_str())
        .expect("user in overview");
    assert_eq!(me["exam_status"], "COMPLETED");
    assert_eq!(me["overall_grade"], "A");
}

#[tokio::test]
async fn expired_session_rejects_answers() {
    let (app, state, pool) = setup(test_rules()).await;
    let user_id = unique_user();

    let session = state
        .exam_service
        .create_exam_session(&user_id)
        .await
        .expect("create session");
    state
        .exam_service
        .start_exam(session.id)
        .await
        .expect("start");

    sqlx::query(
        "UPDATE exam_sessions SET expires_at = NOW() - INTERVAL '1 minute' WHERE id = $1",
    )
    .bind(session.id)
    .execute(&pool)
    .await
    .unwrap();

    let questions = state
        .exam_service
        .session_questions(session.id)
        .await
        .unwrap();
    let option = best_option_id(&pool, questions[0].question_id).await;

    let req = Request::builder()
        .method("POST")
        .uri(format!("/api/v1/exam/{}/answer", user_id))
        .header("content-type", "application/json")
        .body(Body::from(
            json!({
                "exam_question_id": questions[0].exam_question_id,
                "question_option_id": option
            })
            .to_string(),
        ))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    // The sweep inside the active-session lookup flips it to EXPIRED first,
    // so the handler never finds an active session.
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let status: String =
        sqlx::query_scalar("SELECT status::text FROM exam_sessions WHERE id = $1")
            .bind(session.id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(status, "EXPIRED");

    let err = state
        .exam_service
        .get_active_session(&user_id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::SessionNotFound));

    // Direct submission against the expired session fails too.
    let err = state
        .exam_service
        .submit_answer(session.id, questions[0].exam_question_id, option)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ExamExpired));
}

#[tokio::test]
async fn submission_past_deadline_flips_session_to_expired() {
    let (_app, state, pool) = setup(test_rules()).await;
    let user_id = unique_user();

    let session = state
        .exam_service
        .create_exam_session(&user_id)
        .await
        .expect("create session");
    state
        .exam_service
        .start_exam(session.id)
        .await
        .expect("start");

    // Deadline in the past while the status is still IN_PROGRESS: the
    // engine itself must notice during submission, without any sweep
    // having run first.
    sqlx::query(
        "UPDATE exam_sessions SET expires_at = NOW() - INTERVAL '1 minute' WHERE id = $1",
    )
    .bind(session.id)
    .execute(&pool)
    .await
    .unwrap();

    let questions = state
        .exam_service
        .session_questions(session.id)
        .await
        .unwrap();
    let option = best_option_id(&pool, questions[0].question_id).await;

    let err = state
        .exam_service
        .submit_answer(session.id, questions[0].exam_question_id, option)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ExamExpired));

    // The flip is a committed side effect of the failed submission.
    let status: String =
        sqlx::query_scalar("SELECT status::text FROM exam_sessions WHERE id = $1")
            .bind(session.id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(status, "EXPIRED");

    let answers: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM user_answers WHERE exam_session_id = $1")
            .bind(session.id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(answers, 0);
}

#[tokio::test]
async fn creation_is_all_or_nothing_when_bank_is_short() {
    let mut rules = test_rules();
    rules.categories[0].quota = 100_000;
    let (app, state, pool) = setup(rules).await;
    let user_id = unique_user();

    let err = state
        .exam_service
        .create_exam_session(&user_id)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::InsufficientQuestions {
            category: Category::Teknis,
            ..
        }
    ));

    let sessions: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM exam_sessions WHERE user_id = $1")
            .bind(&user_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(sessions, 0);

    let req = Request::builder()
        .method("GET")
        .uri(format!("/api/v1/exam/{}", user_id))
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}
