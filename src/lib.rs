//! East Website - CRUD endpoints and content rendering built from step recipes
//!
//! Every endpoint is a [`recipe::Recipe`]: an ordered list of single purpose
//! steps sharing a workplan. Recipes are assembled in [`endpoints`] and
//! mounted on the axum router in [`api`].

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod endpoints;
pub mod forms;
pub mod http;
pub mod models;
pub mod object;
pub mod recipe;
pub mod services;
pub mod steps;
pub mod templating;
