pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::QuizPolicy;
use crate::database::store::ExamStore;
use crate::services::career_service::{CareerService, JobCatalog};
use crate::services::exam_service::ExamService;
use crate::services::question_bank::QuestionBank;
use crate::utils::time::Clock;

#[derive(Clone)]
pub struct AppState {
    pub exam_service: ExamService,
    pub careers: CareerService,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn ExamStore>,
        bank: Arc<dyn QuestionBank>,
        jobs: Arc<dyn JobCatalog>,
        policy: QuizPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let exam_service = ExamService::new(store, bank, policy, clock.clone());
        Self {
            exam_service,
            careers: CareerService::new(jobs),
            clock,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}
