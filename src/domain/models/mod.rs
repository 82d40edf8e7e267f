pub mod account;
pub mod credential;
pub mod phone_number;
pub mod registration_session;
pub mod step_payloads;
