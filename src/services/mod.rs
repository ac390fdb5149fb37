pub mod answer_ledger;
pub mod career_service;
pub mod exam_service;
pub mod fraud_service;
pub mod question_bank;
pub mod quota_service;
pub mod scoring_service;
