#![allow(unused_assignments)] // thiserror/miette proc macros trigger false positives

pub mod cli;
pub mod config;
pub mod controller;
pub mod detect;
pub mod driver;
pub mod error;
pub mod logging;
pub mod paths;
pub mod process;
pub mod progress;
pub mod prompt;
pub mod recovery;
pub mod settings;
pub mod site;
pub mod state;

#[cfg(test)]
mod testing;
