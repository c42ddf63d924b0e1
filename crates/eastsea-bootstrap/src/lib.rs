//! # Bootstrap
//!
//! Seed-node rejoin, outbound dial budget, and re-announce scheduling
//! from spec.md §4.E. This crate holds pure, synchronous decision
//! logic; `eastsea-node` wires it to the transport and DHT layers —
//! the handler never opens a socket itself, mirroring the teacher
//! workspace's separation of staging/decision logic from I/O adapters.

pub mod client;
pub mod dial_budget;
pub mod responder;
pub mod seeds;

pub use client::{BootstrapClient, DEFAULT_PEERS_REQUEST_MAX, REANNOUNCE_INTERVAL};
pub use dial_budget::{DialBudget, DEFAULT_STARTUP_DIAL_CAP};
pub use responder::{select_peers_to_announce, MAX_PEERS_PER_REPLY};
pub use seeds::{SeedEntry, SeedList};
