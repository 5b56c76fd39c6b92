pub mod samples;
pub mod text;
