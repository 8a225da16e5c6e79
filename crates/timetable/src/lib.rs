//! School timetable service with substitute-teacher handling.
//!
//! The crate has three layers:
//! - pure computations over schedule data ([`availability`], [`conflict`],
//!   [`export`], [`drag`])
//! - workflows that talk to a [`service`] implementation ([`planner`],
//!   [`substitution`])
//! - the implementations: the SQLite store in [`db`] served over HTTP by
//!   [`server`], and the HTTP [`client`]

pub mod availability;
pub mod client;
pub mod config;
pub mod conflict;
pub mod db;
pub mod drag;
pub mod export;
pub mod guard;
pub mod models;
pub mod planner;
pub mod server;
pub mod service;
pub mod substitution;
pub mod types;
