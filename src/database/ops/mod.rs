pub mod bitdocs;
pub mod objects;
pub mod queue;
