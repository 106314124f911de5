//! HTTP route handlers

pub mod catalog;
pub mod health;
pub mod stats;
pub mod tts;
