use axum::{
    routing::{get, post},
    Router,
};
use exam_backend::{
    config::{get_config, init_config},
    database::pool::create_pool,
    routes,
    services::exam_rules::ExamRules,
    AppState,
};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    init_config()?;
    let config = get_config();

    let pool = create_pool().await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let app_state = AppState::new(pool, ExamRules::default());

    let app = Router::new()
        .route("/health", get(routes::health::health))
        .route("/api/v1/exam/:user_id", get(routes::exam::get_or_create_exam))
        .route("/api/v1/exam/:user_id/start", post(routes::exam::start_exam))
        .route("/api/v1/exam/:user_id/answer", post(routes::exam::submit_answer))
        .route(
            "/api/v1/exam/:user_id/complete",
            post(routes::exam::complete_exam),
        )
        .route("/api/v1/exam/:user_id/results", get(routes::exam::get_results))
        .route("/api/v1/exam/:user_id/answers", get(routes::exam::get_answers))
        .route(
            "/api/v1/exam/:user_id/detailed-answers",
            get(routes::exam::get_detailed_answers),
        )
        .route(
            "/api/v1/exam/:user_id/dashboard",
            get(routes::exam::get_dashboard),
        )
        .route(
            "/api/v1/dashboard/users",
            get(routes::exam::all_users_dashboard),
        )
        .with_state(app_state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = config.server_address.parse()?;
    info!("Server listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
