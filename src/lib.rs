pub mod bot;
pub mod capture;
pub mod command;
pub mod config;
pub mod discord;
pub mod error;
pub mod mention;
pub mod platform;
pub mod router;
pub mod session;
pub mod stream;
pub mod types;

#[cfg(test)]
mod testing;

pub use bot::run;
