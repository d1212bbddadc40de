pub mod auth;
pub mod clock;
pub mod config;
pub mod db;
pub mod engine;
pub mod entities;
pub mod error;
pub mod events;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod schedule;
pub mod status;
pub mod views;
