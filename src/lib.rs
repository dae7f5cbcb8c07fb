pub mod app;
pub mod batch;
pub mod config;
pub mod domain;
pub mod error;
pub mod input;
pub mod normalize;
pub mod output;
pub mod sink;
