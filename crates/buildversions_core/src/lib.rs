pub mod auth;
pub mod client;
pub mod config;
pub mod markup;
pub mod model;
pub mod parse;
pub mod publish;
pub mod render;
