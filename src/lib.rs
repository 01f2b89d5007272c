pub mod config;
pub mod dispatcher;
pub mod input;
pub mod protocol;
pub mod relay;
pub mod session;
pub mod teleop;
pub mod transport;
