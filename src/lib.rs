// src/lib.rs — Library root for browserpilot

pub mod api;
pub mod browser;
pub mod cli;
pub mod infra;
pub mod pipeline;
pub mod provider;
pub mod reasoning;
pub mod session;
