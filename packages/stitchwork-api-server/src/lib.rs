#![deny(unused_crate_dependencies)]
pub mod api;
pub mod cli;
pub(crate) mod commands;
pub(crate) mod models;
pub mod upstream;
mod uses;

#[cfg(test)]
use tower as _;
