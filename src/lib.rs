// Core infrastructure modules
pub mod core;

// Pipeline modules
pub mod cache;
pub mod config;
pub mod dashboards;
pub mod fetch;
pub mod normalize;
pub mod settings;
pub mod summary;

#[cfg(test)]
pub(crate) mod test_utils;
