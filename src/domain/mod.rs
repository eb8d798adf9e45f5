pub mod cycle;
pub mod models;
