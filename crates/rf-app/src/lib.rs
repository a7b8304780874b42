//! RegFlow Application Layer
//!
//! This crate contains the registration store, the token lifecycle
//! manager, the navigation guards and the business use cases.

pub mod guards;
pub mod store;
pub mod token;
pub mod usecases;

pub use guards::{StepGuard, TokenGuard};
pub use store::{RegistrationStore, SyncListener};
pub use token::TokenManager;
pub use usecases::{
    LookupAddress, ResendOtp, ResendOtpOutcome, SubmitRegistration, SubmitOutcome, VerifyOtp,
    VerifyOutcome,
};
