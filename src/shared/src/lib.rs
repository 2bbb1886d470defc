pub mod channel;
pub mod protocol;
pub mod settings;
pub mod store;
