pub mod poller;
pub mod price_alert_service;
pub mod watchlist_service;

pub use poller::{ PollOutcome, Poller };
pub use price_alert_service::PriceAlertService;
pub use watchlist_service::WatchlistService;
