//! Data cleaning and regression pipeline for a table of film releases.
//!
//! [`pipeline::run`] loads a delimited file, derives features, applies the
//! exclusion policy, and fits the OLS and mixed-effects models described by a
//! [`config::PipelineConfig`]. Every stage is also usable on its own.

pub mod config;
pub mod data;
pub mod error;
pub mod pipeline;
pub mod report;
pub mod stats;
