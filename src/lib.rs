pub mod config;
pub mod connection;
pub mod frame;
pub mod model;
pub mod packet;
pub mod server;
