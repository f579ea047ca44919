pub mod bitdoc;
pub mod object;
pub mod task;
