pub mod registration_finalizer;
pub mod registration_state_machine;
pub mod retry;
