//! # ranktrack
//!
//! A search-rank extraction and trend-tracking pipeline.
//!
//! ranktrack resolves where a domain ranks in Google organic, local, and
//! AI-mode results for tracked keywords by querying an external
//! search-results API, persists one snapshot per tracked identity, and
//! maintains rolling 24h/7d/30d trend baselines for dashboards and
//! reports.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌───────────┐
//! │  Provider   │──▶│   Resolver    │──▶│  SQLite    │
//! │ (SerpApi)   │   │ Match+Trend  │   │ Snapshots │
//! └─────────────┘   └──────────────┘   └────┬──────┘
//!                                           │
//!                       ┌───────────────────┤
//!                       ▼                   ▼
//!                  ┌──────────┐       ┌──────────┐
//!                  │   CLI    │       │   HTTP   │
//!                  │ (rankt)  │       │  (JSON)  │
//!                  └──────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! rankt init                                    # create database
//! rankt track "pizza nyc" --domain joes-pizza.com
//! rankt history --domain joes-pizza.com         # positions + trends
//! rankt refresh                                 # batch update (cron)
//! rankt serve                                   # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`matcher`] | Domain normalization and fallback matching |
//! | [`provider`] | Search-results API client |
//! | [`resolver`] | Pagination control flow and rank extraction |
//! | [`trend`] | Rolling baselines and directional deltas |
//! | [`store`] | Snapshot persistence contract and backends |
//! | [`ai_mode`] | AI-answer mention extraction |
//! | [`track`] | Interactive tracking pipeline |
//! | [`refresh`] | Scheduled batch refresh |
//! | [`history`] | Snapshot readout with trends |
//! | [`server`] | JSON HTTP server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod ai_mode;
pub mod config;
pub mod db;
pub mod history;
pub mod matcher;
pub mod migrate;
pub mod models;
pub mod provider;
pub mod refresh;
pub mod resolver;
pub mod server;
pub mod store;
pub mod track;
pub mod trend;
