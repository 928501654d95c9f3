pub mod connection;
pub mod trade;

pub use connection::{ConnectionRecord, ConnectionRegistry};
pub use trade::{TradeRecord, TradeRegistry};
