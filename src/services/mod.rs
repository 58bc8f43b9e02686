pub mod exam_rules;
pub mod exam_service;
pub mod question_service;
