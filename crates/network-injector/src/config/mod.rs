pub mod cli;
pub mod injector;

pub use cli::*;
pub use injector::*;
