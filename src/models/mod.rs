// src/models/mod.rs
//! Data structures shared by the lifecycle coordinator and its collaborators.

pub mod audit;
pub mod did;
pub mod lifecycle;
pub mod subject;
