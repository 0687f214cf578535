pub mod config;
pub mod controller;
pub mod daemon;
pub mod gate;
pub mod host;
pub mod sampler;
