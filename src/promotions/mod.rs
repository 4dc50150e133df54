pub mod dto;
pub mod repo;
