// src/models/mod.rs

pub mod exam;
pub mod problem;
pub mod scope;
pub mod tracker;
pub mod user;
