pub mod client;
pub mod connection;
pub mod events;
pub mod models;
