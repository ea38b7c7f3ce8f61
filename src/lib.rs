pub mod config;
pub mod fetch;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod registry;
pub mod summary;
pub mod validate;
