// src/core/mod.rs

pub mod bootstrap;
pub mod cache;
pub mod command_queue;
pub mod config_loader;
pub mod file_patterns;
pub mod injection;
pub mod markers;
pub mod metadata_scanner;
pub mod module_loader;
pub mod paths;
pub mod plugin_graph;
pub mod registry;
pub mod settings_resolver;
