// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

pub mod builtins;
pub mod commands;
pub mod config;
pub mod loader;

pub use builtins::builtin_engine;
pub use config::{Config, CsvOptions, SampleConfig, load_config, resolve_config};
pub use loader::{load_csv, parse_csv};
