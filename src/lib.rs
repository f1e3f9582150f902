pub mod balance;
pub mod budget;
pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod insights;
pub mod metadata;
pub mod models;
pub mod price;
pub mod query;
pub mod receipt;
pub mod rpc;
pub mod scanner;
pub mod validation;
pub mod web;
