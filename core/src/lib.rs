pub mod cache;
pub mod config;
pub mod engine;
pub mod entities;
pub mod error;
pub mod honeypot;
pub mod oracle;
pub mod response;
pub mod ssf;
