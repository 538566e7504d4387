pub mod dto;
pub mod lockout;
pub mod repo;
pub mod repo_types;
pub mod services;
