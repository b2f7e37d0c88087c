// Library exports for MindFuse - emotion sampling core

pub mod aggregate;
pub mod camera;
pub mod config;
pub mod dashboard;
pub mod detector;
pub mod emotion;
pub mod error;
pub mod history;
pub mod models;
pub mod simulation;
