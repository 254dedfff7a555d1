//! Reusable engine components.

pub mod arbitrage;
pub mod domain;
pub mod exchange;
pub mod market;
pub mod service;
