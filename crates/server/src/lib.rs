//! Prediction and monitoring HTTP service for obesity risk classification

pub mod api;
pub mod config;
pub mod error;
