//! Run configuration and the end-to-end analysis pipeline

pub mod config;
pub mod pipeline;


pub use config::{CONFIG_FILE, CacheSettings, ClassifierSettings, RunConfig, SplitSettings, load, load_config};
pub use pipeline::{Pipeline, RunOutput};
