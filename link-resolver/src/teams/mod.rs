pub mod team_models;
pub mod team_operations;
