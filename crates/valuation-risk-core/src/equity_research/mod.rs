pub mod football_field;
