pub mod analytics;
pub mod grade;
pub mod matcher;
pub mod selector;
pub mod tags;
pub mod types;
pub mod updater;
pub mod zpd;
