pub mod exam;
pub mod question;
