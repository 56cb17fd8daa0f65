pub mod connection;
pub mod exchange;

pub use connection::SessionPhase;
pub use exchange::ExchangePhase;
