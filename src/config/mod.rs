// src/config/mod.rs
pub mod classifier;
pub mod upstream;

pub use classifier::ClassifierConfig;
pub use upstream::UpstreamConfig;
