// src/services/mod.rs
pub mod api_server;
pub mod audit;
pub mod did_coordinator;
pub mod subject_locks;

#[cfg(test)]
pub mod test_support;
