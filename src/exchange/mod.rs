pub mod client;
pub mod errors;
pub mod noop;

pub use client::{BinanceFuturesClient, ExchangeClient, NewOrderParams, OrderAck, OrderInfo};
pub use errors::ExchangeError;
pub use noop::DryRunClient;
