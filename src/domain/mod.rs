//! Domain layer: entities, value objects and the ports the engines depend on.

pub mod account;
pub mod notification;
pub mod otp;
pub mod ports;
pub mod transaction;
pub mod user;
