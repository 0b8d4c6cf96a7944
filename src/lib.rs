pub mod archive;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod server;
pub mod utils;

#[cfg(test)]
mod test_support;
