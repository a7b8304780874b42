//! Registration wizard domain models
//!
//! The wizard has two steps: information entry (step 1) and OTP
//! verification (step 2). `FormData` is owned by the registration store
//! and only mutated through its update operations; `RegistrationState`
//! is the in-memory snapshot the store publishes to subscribers.

mod form;
mod state;

pub use form::{Address, BirthDate, FormData, FormDataPatch};
pub use state::{RegistrationState, StateError, Step};
