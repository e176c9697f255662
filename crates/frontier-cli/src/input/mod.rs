pub mod file;
pub mod prices;
pub mod request;
pub mod stdin;
