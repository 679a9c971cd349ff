// src/services/mod.rs

pub mod generator;
pub mod grader;
pub mod tracker;
