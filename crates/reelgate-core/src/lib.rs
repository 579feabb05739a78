pub mod adstrip;
pub mod config;
pub mod error;
pub mod history;
pub mod models;
pub mod providers;
pub mod resolver;
pub mod route;
pub mod storage;
pub mod view;
