//! Domain entities, value objects, and the ports the application layer
//! drives them through.

pub mod catalog;
pub mod coupon;
pub mod funnel;
pub mod money;
pub mod order;
pub mod ports;
pub mod quote;
pub mod session;
