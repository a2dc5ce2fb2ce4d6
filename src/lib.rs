pub mod cache;
pub mod cache_keys;
pub mod cli;
pub mod configuration;
pub mod controller;
pub mod error;
pub mod handler;
pub mod helpers;
pub mod provider;
pub mod types;

#[cfg(test)]
mod test_utils;
