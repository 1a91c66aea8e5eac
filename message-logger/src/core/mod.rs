/*!
Core modules for the deletion interception and logging pipeline
*/

pub mod cache;
pub mod config;
pub mod error;
pub mod interceptor;
pub mod log_writer;
pub mod pipeline;
pub mod proxy;
pub mod record;
pub mod session;
