pub mod backend;
pub mod cache;
pub mod compositor;
pub mod config;
pub mod decision;
pub mod error;
pub mod pdf;
pub mod pipeline;
pub mod raster;
