pub mod config;
pub mod io;
pub mod pipeline;
pub mod sonify;
pub mod tracking;
pub mod vision;
