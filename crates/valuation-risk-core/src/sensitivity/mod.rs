pub mod grid;
pub mod tornado;
