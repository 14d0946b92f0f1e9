//! Tooma payments in Rust.
//!
//! This crate implements the payment-session orchestration behind Tooma:
//! converting on-chain fungible assets into mobile-money payouts (M-Pesa,
//! Airtel Money, MTN, …) and on-ramping fiat into crypto.
//!
//! The building blocks, leaf first:
//!
//! - [`rates`] – asset-specific conversion quotes with a fixed USD
//!   exchange-rate fallback for display.
//! - [`balances`] – supported-currency catalog joined against live
//!   on-chain balances, with boundary-exact sufficiency checks.
//! - [`backend`] – typed client for the payment backend (sessions,
//!   payment methods, on-ramp, history, catalogs).
//! - [`chain`] – transaction composition and submission in self-paid and
//!   gas-sponsored modes, with wait-for-commit finality.
//! - [`sponsor`] – the two-party sponsorship protocol and its BCS+base64
//!   serialization contract.
//! - [`settlement`] – the off-chain settlement watch: polling or a
//!   server-push stream, normalized statuses, budget-bounded timeout.
//! - [`orchestrator`] – the state machine sequencing the above into the
//!   on-ramp and pay flows.
//!
//! The [`handlers`] module and the `tooma-sponsord` binary form the
//! server-side half: sponsored-transaction assembly and the rate-provider
//! proxies, keeping both private keys out of client reach.

pub mod backend;
pub mod balances;
pub mod chain;
pub mod from_env;
pub mod handlers;
pub mod network;
pub mod orchestrator;
pub mod rates;
pub mod settlement;
pub mod shutdown;
pub mod sponsor;
pub mod telemetry;
pub mod types;
