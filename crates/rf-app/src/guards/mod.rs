//! Navigation guards for the registration wizard

mod step_guard;
mod token_guard;

pub use step_guard::StepGuard;
pub use token_guard::TokenGuard;
