pub mod config;
pub mod generation;
pub mod kv;
pub mod media;
pub mod quota;
pub mod resolver;
pub mod server;
