pub mod assets;
pub mod credentials;
pub mod events;
pub mod library;
pub mod models;
pub mod options;
pub mod store;
