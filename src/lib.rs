//! wagate — a token-gated HTTP API over a WhatsApp Web session.
//!
//! The heavy lifting (pairing, encryption, message delivery) is done by the
//! real WhatsApp Web application running in a WebDriver-controlled browser.
//! This crate is the thin layer around it: a bearer-token gate, a login-state
//! tracker fed by client lifecycle events, and four JSON routes.
//!
//! Modules:
//! - [`config`] — TOML config plus environment and CLI overrides
//! - [`client`] — the messaging-client trait and its browser implementation
//! - [`session`] — process-wide login state, driven by client events
//! - [`gateway`] — the axum HTTP surface
//! - [`qr`] — QR payload rendering (PNG data URL, terminal)

pub mod client;
pub mod config;
pub mod gateway;
pub mod qr;
pub mod session;
