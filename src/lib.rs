pub mod annotation;
pub mod classify;
pub mod config;
pub mod domain;
pub mod emit;
pub mod error;
pub mod layout;
pub mod loader;
pub mod normalize;
pub mod output;
pub mod pipeline;
