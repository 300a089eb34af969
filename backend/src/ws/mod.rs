pub mod gateway;
pub mod handshake;
pub mod rooms;
