pub mod backfill;
pub mod links_model;
pub mod resolution_service;
