pub mod client;
pub mod config;
pub mod model;
pub mod parsers;
pub mod protocol;
pub mod services;
