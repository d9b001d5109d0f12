//! cfddns - keeps Cloudflare DNS records pointed at this host's public IP
//!
//! Architecture:
//! - Public IP resolved over HTTP from a fixed list of endpoints
//! - One reconciliation tick at a time, domains processed in order
//! - Telegram and Discord notifications for updates and alerts
//! - Uses reqwest for HTTP (rustls)

pub mod cloudflare;
pub mod config;
pub mod constants;
pub mod daemon;
pub mod dns_provider;
pub mod health;
pub mod ip;
pub mod metrics;
pub mod notify;
pub mod reconcile;
pub mod retry;
pub mod state;
pub mod validation;

#[cfg(test)]
mod testing;
