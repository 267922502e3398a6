pub mod activity_store;
pub mod autopilot;
pub mod constants;
pub mod engine;
pub mod error;
pub mod probability;
pub mod rng;
pub mod server_protocol;
pub mod server_utils;
pub mod types;
pub mod world;
