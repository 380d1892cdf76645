// SPDX-FileCopyrightText: © 2025 Gibberlink Contributors
//
// SPDX-License-Identifier: MPL-2.0

pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod rate_limit;
pub mod server;
pub mod state;
pub mod telemetry;
pub mod websocket;

// Re-export commonly used items for convenience
pub use config::Config;
pub use state::AppState;
