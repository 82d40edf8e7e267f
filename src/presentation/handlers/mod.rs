pub mod health_handler;
pub mod registration_handler;
