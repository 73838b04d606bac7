pub mod config;
pub mod media;
pub mod outline;
pub mod page;
pub mod render;
pub mod viewer;
