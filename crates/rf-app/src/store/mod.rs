//! Registration state store and persistence synchronization

mod registration_store;
mod sync_listener;

pub use registration_store::RegistrationStore;
pub use sync_listener::SyncListener;
