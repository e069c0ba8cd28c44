pub mod app;
pub mod models;
pub mod pool;
pub mod random;
pub mod tmdb;
