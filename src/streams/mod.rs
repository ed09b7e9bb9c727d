mod live;
mod trade_log;

pub use live::run_trading_session;
pub use trade_log::TradeLogger;
