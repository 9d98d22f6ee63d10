//! Core domain models for workflows
//!
//! This module defines the fundamental data structures that represent
//! workflows, their triggers and matrices, run instances and their steps.

pub mod config;
pub mod context;
pub mod matrix;
pub mod run;
pub mod state;
pub mod step;
pub mod trigger;
pub mod workflow;

pub use context::*;
pub use matrix::*;
pub use run::*;
pub use state::*;
pub use step::*;
pub use trigger::*;
pub use workflow::*;
