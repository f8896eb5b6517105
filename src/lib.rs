pub mod archive;
pub mod cleanup;
pub mod commands;
pub mod download;
pub mod env;
pub mod http;
pub mod manifest;
pub mod platform;
pub mod runtime;
pub mod settings;
