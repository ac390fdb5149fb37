use axum::extract::DefaultBodyLimit;
use holland_assessment::{
    config::{get_config, init_config, StorageBackend},
    database::{
        memory::MemoryExamStore,
        pool::{create_pool, run_migrations},
        postgres::PgExamStore,
        store::ExamStore,
    },
    middleware::{cors::quiz_cors, rate_limit::new_rps_state},
    routes,
    services::career_service::{JobCatalog, PgJobCatalog, StaticJobCatalog},
    services::question_bank::{PgQuestionBank, QuestionBank, StaticQuestionBank},
    utils::time::SystemClock,
    AppState,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn")),
        )
        .init();
    init_config()?;
    let config = get_config();

    let (store, bank, jobs): (
        Arc<dyn ExamStore>,
        Arc<dyn QuestionBank>,
        Arc<dyn JobCatalog>,
    ) = match config.storage_backend {
        StorageBackend::Postgres => {
            let pool = create_pool().await?;
            run_migrations(&pool).await?;
            info!("Using postgres storage");
            (
                Arc::new(PgExamStore::new(pool.clone())),
                Arc::new(PgQuestionBank::new(pool.clone())),
                Arc::new(PgJobCatalog::new(pool)),
            )
        }
        StorageBackend::Memory => {
            let path = config.question_bank_path.as_deref().ok_or_else(|| {
                anyhow::anyhow!("QUESTION_BANK_PATH is required for the memory backend")
            })?;
            let bank = StaticQuestionBank::from_json_file(path)?;
            tracing::warn!(
                questions = bank.len(),
                "Using in-memory storage; exams are lost on restart"
            );
            let jobs = match config.job_catalog_path.as_deref() {
                Some(path) => StaticJobCatalog::from_json_file(path)?,
                None => {
                    tracing::warn!("JOB_CATALOG_PATH not set; career suggestions will be empty");
                    StaticJobCatalog::default()
                }
            };
            (Arc::new(MemoryExamStore::new()), Arc::new(bank), Arc::new(jobs))
        }
    };

    let app_state = AppState::new(store, bank, jobs, config.quiz.clone(), Arc::new(SystemClock));

    let limiter = new_rps_state(config.public_rps, config.trust_proxy_headers);
    let app = routes::router(app_state, limiter)
        .layer(quiz_cors())
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(64 * 1024));

    let addr: SocketAddr = config.server_address.parse()?;
    info!("Server listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
