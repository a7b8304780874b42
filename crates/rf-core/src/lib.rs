//! # rf-core
//!
//! Core domain models and business logic for RegFlow.
//!
//! This crate contains pure business logic without any infrastructure dependencies.

// Public module exports
pub mod config;
pub mod guard;
pub mod ports;
pub mod registration;
pub mod token;
pub mod validators;

// Re-export commonly used types at the crate root
pub use config::RegistrationConfig;
pub use guard::{AccessDenied, DenyCode, Guard, GuardContext, GuardOutcome, NavTarget};
pub use registration::{
    Address, BirthDate, FormData, FormDataPatch, RegistrationState, StateError, Step,
};
pub use token::{TokenError, TokenPayload};
