pub mod mode;
pub mod no_context;
pub mod query;
pub mod score;
pub mod text;
