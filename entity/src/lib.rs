//! sea-orm entities for the onboarding service.
//!
//! `registration_sessions` holds in-progress wizards; `accounts`, `merchants`
//! and `drivers` are the permanent records written by finalization.

pub mod accounts;
pub mod drivers;
pub mod merchants;
pub mod registration_sessions;

pub mod prelude {
    pub use super::accounts::Entity as Accounts;
    pub use super::drivers::Entity as Drivers;
    pub use super::merchants::Entity as Merchants;
    pub use super::registration_sessions::Entity as RegistrationSessions;
}
