pub mod config;
pub mod enums;
pub mod error;
pub mod models;
pub mod rules;
pub mod credentials;
pub mod providers;
pub mod db;
pub mod store;
pub mod notify;
pub mod bot;
pub mod services;
pub mod alert_checker;
pub mod scheduler;
pub mod api;

pub use config::Config;
pub use enums::{ Chain, Condition, DataSource, EntityKind, TxDirection };
pub use error::{ AppError, PollError, Result };
