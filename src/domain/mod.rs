pub mod bot_config;
pub mod candle;
pub mod enums;
pub mod order_state;
pub mod position;
pub mod signal;

pub use bot_config::BotConfig;
pub use candle::{Candle, CandleParseError};
pub use enums::{BotStatus, Color, Environment, ExchangeErrorKind, OrderStatus, Regime, Side, SideWhitelist};
pub use order_state::OrderState;
pub use position::Position;
pub use signal::{ArmSignal, DisarmSignal, Signal, SignalParseError};
