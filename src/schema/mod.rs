pub mod mode;
pub mod record;
pub mod script;
