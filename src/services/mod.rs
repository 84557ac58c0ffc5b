//! Services separating file access from pipeline logic

pub mod io;

pub use io::ImageIOService;
