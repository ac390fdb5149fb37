pub mod answer;
pub mod career;
pub mod exam;
pub mod fraud;
pub mod question;
pub mod quota;
pub mod result;
