#![allow(dead_code)]

use std::env;
use std::sync::{Arc, Once};

use chrono::{TimeZone, Utc};
use holland_assessment::config::QuizPolicy;
use holland_assessment::database::memory::MemoryExamStore;
use holland_assessment::models::career::Job;
use holland_assessment::models::question::{Question, TraitGroup};
use holland_assessment::services::exam_service::ExamService;
use holland_assessment::services::career_service::StaticJobCatalog;
use holland_assessment::services::question_bank::StaticQuestionBank;
use holland_assessment::utils::time::ManualClock;

pub const JWT_SECRET: &str = "test_secret_key";

/// No period-2/3 rhythm, one third agrees, each value ten times.
pub const VARIED: [i32; 30] = [
    2, 0, 1, 1, 2, 0, 0, 2, 1, 2, 1, 0, 0, 1, 2, 2, 0, 1, 1, 0, 2, 0, 2, 1, 1, 0, 0, 2, 1, 2,
];

static INIT: Once = Once::new();

pub fn init_env() {
    INIT.call_once(|| {
        env::set_var("SERVER_ADDRESS", "127.0.0.1:0");
        env::set_var("JWT_SECRET", JWT_SECRET);
        env::set_var("STORAGE_BACKEND", "memory");
        env::set_var("PUBLIC_RPS", "1000");
        let _ = holland_assessment::config::init_config();
    });
}

/// Twenty questions per group, ids grouped by hundreds.
pub fn question_bank() -> StaticQuestionBank {
    let mut questions = Vec::new();
    for group in TraitGroup::ALL {
        for n in 1..=20 {
            questions.push(Question {
                id: (group.index() as i64 + 1) * 100 + n,
                text: format!("{} statement {}", group.label(), n),
                trait_group: group,
            });
        }
    }
    StaticQuestionBank::new(questions)
}

/// One job under every one, two and three letter code, ids in code order.
pub fn job_catalog() -> StaticJobCatalog {
    let mut codes: Vec<String> = Vec::new();
    for a in TraitGroup::ALL {
        codes.push(a.to_string());
        for b in TraitGroup::ALL.into_iter().filter(|b| *b != a) {
            codes.push(format!("{}{}", a, b));
            for c in TraitGroup::ALL.into_iter().filter(|c| *c != a && *c != b) {
                codes.push(format!("{}{}{}", a, b, c));
            }
        }
    }
    let jobs = codes
        .into_iter()
        .enumerate()
        .map(|(n, code)| Job {
            id: n as i64 + 1,
            job_name: format!("{} specialist", code),
            job_name_en: None,
            holland_code: code,
            job_group: None,
            description: None,
            education_level: None,
            work_environment: None,
            is_active: true,
        })
        .collect();
    StaticJobCatalog::new(jobs).expect("valid job codes")
}

pub fn clock() -> ManualClock {
    ManualClock::new(Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap())
}

pub fn engine(policy: QuizPolicy) -> (ExamService, ManualClock) {
    let clock = clock();
    let service = ExamService::new(
        Arc::new(MemoryExamStore::new()),
        Arc::new(question_bank()),
        policy,
        Arc::new(clock.clone()),
    );
    (service, clock)
}

/// The varied answer for the n-th question of an exam.
pub fn varied(n: usize) -> i32 {
    VARIED[n % VARIED.len()]
}
