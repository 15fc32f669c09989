pub mod config;
pub mod crypto;
pub mod eth;
pub mod image;
pub mod platform;
pub mod secure_keys;
pub mod storage;
