//! Token lifecycle management

mod manager;

pub use manager::TokenManager;
