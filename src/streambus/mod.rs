pub mod bus;
pub mod dedupe;
pub mod keys;

pub use bus::StreamBus;
