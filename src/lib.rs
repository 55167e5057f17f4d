//! Honyaku - Background Chapter Translation
//!
//! A durable, prioritized job queue that translates chapters through pluggable
//! engines (Ollama, LibreTranslate, DeepL) and caches the results per language.

pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod text;
pub mod engine;
pub mod cache;
pub mod store;
pub mod library;
pub mod service;
