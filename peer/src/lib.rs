//! # Token Ring Peer Library
//!
//! This library implements one peer of a ring of game instances that take
//! turns being authoritative. Authority is a token: an ordered history of
//! state changes that travels from peer to peer. Whoever holds it folds its
//! own pending changes into the history, applies what the others did, and
//! passes the consolidated token on.
//!
//! ## Core Responsibilities
//!
//! ### Reconciliation
//! When the token arrives, locally produced changes are checked against the
//! new changes the token carries. Token changes always win: a conflicting
//! local change is rolled back and dropped, every token change is applied.
//!
//! ### Exactly-Once Application
//! A tick watermark records how far the token history has already been
//! folded into local state. Only changes above it are applied, so history that
//! comes around the ring a second time is never applied twice.
//!
//! ### Deterministic Movement
//! Move changes are re-applied on every peer by running the same integer A*
//! search over the same map, so all peers route creatures identically.
//!
//! ## Architecture Design
//!
//! ### Two Tasks, One Lock
//! The simulation loop advances the world at a fixed tick rate while the ring
//! task waits for tokens. Both touch the world only through a single
//! `RwLock`, and a hand-off holds the write lock for its whole duration, so a
//! merge never observes a world that moves underneath it.
//!
//! ### Deferred Local Changes
//! Player commands are queued as changes and take effect only once a
//! hand-off accepts them. Rolling back a rejected command is therefore just
//! dropping it.
//!
//! ## Module Organization
//!
//! ### World Module (`world`)
//! Creatures, the tile grid and the queue of pending local changes.
//!
//! ### Reconcile Module (`reconcile`)
//! Conflict policies, rollback strategies, token filtering and the merge.
//!
//! ### Handoff Module (`handoff`)
//! The tick watermark and the per-token hand-off sequence.
//!
//! ### Network Module (`network`)
//! UDP token ring: receiving, handing off and forwarding the token, and
//! re-sending it when the ring goes quiet.
//!
//! ### Simulation Module (`simulation`)
//! Fixed-rate tick loop and an optional autopilot that issues random orders.
//!
//! ### Config Module (`config`)
//! Validated settings and deterministic world setup shared by all peers.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use peer::config::PeerConfig;
//! use peer::handoff::HostHandoff;
//! use peer::network::TokenRing;
//! use peer::reconcile::ReconciliationEngine;
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio::sync::RwLock;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PeerConfig {
//!         bind: "127.0.0.1:7000".parse()?,
//!         next: "127.0.0.1:7001".parse()?,
//!         player_id: 1,
//!         players: vec![1, 2],
//!         creatures_per_player: 3,
//!         map: None,
//!         tick_rate: 20,
//!         hold: Duration::from_millis(10),
//!         token_timeout: Duration::from_secs(2),
//!         history_window: 600,
//!         initiator: true,
//!         autopilot: false,
//!         seed: 0,
//!     }
//!     .validate()?;
//!
//!     let world = config.build_world(config.load_grid()?)?;
//!     let world = Arc::new(RwLock::new(world));
//!     let engine = ReconciliationEngine::default();
//!     let handoff = HostHandoff::new(world, engine, config.history_window);
//!
//!     let mut ring = TokenRing::bind(&config, handoff).await?;
//!     ring.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod handoff;
pub mod network;
pub mod reconcile;
pub mod simulation;
pub mod world;
