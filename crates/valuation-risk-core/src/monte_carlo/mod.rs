pub mod backend;
pub mod simulation;
