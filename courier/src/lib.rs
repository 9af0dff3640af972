pub mod controller;
pub mod file_sender;
