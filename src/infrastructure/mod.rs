pub mod account_store;
pub mod argon2_password_hasher;
pub mod in_memory_otp_gate;
pub mod jwt_token_generator;
pub mod registration_session_store;
pub mod repository;
pub mod schema;
pub mod unit_of_work;
