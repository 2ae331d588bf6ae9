pub mod football_field;
pub mod sensitivity;
pub mod simulation;
