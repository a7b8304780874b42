//! Port interfaces for the application layer
//!
//! Ports define the contract between the application logic and
//! infrastructure implementations, keeping the core independent of the
//! hosting platform (browser-like shell, desktop runtime, tests).

mod clock;
mod key_value_store;
mod registration_api;

pub use clock::ClockPort;
pub use key_value_store::{
    KeyValueStorePort, PersistenceError, StorageChange, AUTH_TOKEN_KEY, FORM_DATA_KEY,
    INIT_FLAG_KEY, STEP_KEY,
};
pub use registration_api::{
    ApiError, ApiResponse, RegistrationApiPort, SendOtpData, VerifyOtpData,
};
