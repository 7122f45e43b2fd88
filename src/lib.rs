//! Multi-zone heating controller.
//!
//! Zone simulators publish their state into per-zone register banks, a
//! periodic control loop reads them over Modbus (or in-process), decides a
//! target temperature per zone and writes it back. The same decision engine
//! replays archived weather in historical runs.

pub mod api;
pub mod config;
pub mod controller;
pub mod domain;
pub mod forecast;
pub mod hardware;
pub mod historical;
pub mod modbus;
pub mod pricing;
pub mod repo;
pub mod simulation;
pub mod telemetry;
