// src/handlers/mod.rs

pub mod admin;
pub mod auth;
pub mod dashboard;
pub mod exam;
pub mod scope;
