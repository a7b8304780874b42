//! Business use cases for the registration wizard

mod api_failure;
mod lookup_address;
mod resend_otp;
mod submit_registration;
mod verify_otp;

pub use api_failure::{handle_api_error, preflight_token_check};
pub use lookup_address::LookupAddress;
pub use resend_otp::{ResendOtp, ResendOtpOutcome};
pub use submit_registration::{SubmitRegistration, SubmitOutcome};
pub use verify_otp::{VerifyOtp, VerifyOutcome};
