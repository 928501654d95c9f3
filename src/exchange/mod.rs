pub mod candle_stream;
pub mod client;
pub mod subscription;

pub use client::{FuturesExchangeClient, KrakenDemoClient};
