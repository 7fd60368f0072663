pub mod client;
pub mod config;
pub mod handlers;
pub mod messaging;
pub mod middleware;
pub mod models;
pub mod repository;
pub mod routes;
pub mod rules;
pub mod usecase;
pub mod utils;
