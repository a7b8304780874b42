//! HTTP adapters for the registration/OTP collaborator API

mod registration_client;

pub use registration_client::RegistrationClient;
