//! VoltGuard client: live camera feed, notification stream and the energy
//! assistant for the VoltGuard home energy-monitoring backend.

pub mod analytics;
pub mod backend;
pub mod chat;
pub mod cli;
pub mod config;
pub mod feed;
pub mod gamification;
pub mod llm;
pub mod mcp;
pub mod notifications;
pub mod socket;
