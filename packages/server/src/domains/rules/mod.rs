pub mod actions;
pub mod condition;
pub mod models;
