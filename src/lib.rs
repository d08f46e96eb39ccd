pub mod api;
pub mod calendar;
pub mod config;
pub mod db;
pub mod elo;
pub mod error;
pub mod leaderboard;
pub mod metrics;
pub mod players;
pub mod recorder;
pub mod reports;
