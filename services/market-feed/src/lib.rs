//! Market Feed
//!
//! Tick sources (live Finnhub websocket or a simulated random walk) behind a
//! single connector, plus aggregation of ticks into fixed-width OHLC bars.

pub mod types;
pub mod sources {
    pub mod finnhub_ws;
    pub mod simulated;
}
pub mod aggregators;
pub mod connector;

pub use aggregators::{BarAggregator, BarUpdate};
pub use connector::FeedConnector;
pub use sources::finnhub_ws::FinnhubStream;
pub use sources::simulated::SimulatedSource;
pub use types::*;
