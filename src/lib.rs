pub mod api;
pub mod config;
pub mod gui;
pub mod key_gen;
pub mod migration;
mod orm;
pub mod url_repo;
pub mod url_service;
