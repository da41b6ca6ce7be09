pub mod director;
pub mod macros;
pub mod parser;
pub mod registry;
pub mod scheduler;
