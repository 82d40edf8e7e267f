pub mod account_repository;
pub mod registration_session_repository;
