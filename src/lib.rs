pub mod app;
pub mod blast;
pub mod config;
pub mod domain;
pub mod entrez;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod logging;
pub mod output;
pub mod store;
pub mod verify;
