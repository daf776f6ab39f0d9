//! Job preparation and supervision for Underworld lithospheric model runs.

pub mod cleanup;
pub mod command;
pub mod config;
pub mod domain;
pub mod model;
pub mod pipeline;
pub mod restart;
pub mod solver;
pub mod supervisor;

#[cfg(test)]
mod test_support;
