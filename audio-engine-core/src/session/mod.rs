pub mod auto_save;
pub mod capture_tap;
pub mod engine;
pub mod graph;
