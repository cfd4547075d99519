pub mod actions;
pub mod compose;
pub mod config;
mod document;
mod emit;
pub mod error;
pub mod generate;
pub mod jobs;
pub mod merge;
pub mod ops;
pub mod reflow;
pub mod region;
pub mod runtime;
