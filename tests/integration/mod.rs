pub mod experiments;
pub mod lifecycle;
