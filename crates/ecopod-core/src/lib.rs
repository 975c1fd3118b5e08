//! Ecopod Core - Domain logic and port definitions
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain types** - `DeviceMode`, `DirectoryLayout`, `SyncCycle`,
//!   `DeviceRuntimeState`, `RebootPolicy` and validated identifier newtypes
//! - **Port definitions** - Traits for adapters: `ICaptureSensor`,
//!   `IIndicator`, `IRemoteStore`, `IModemControl`, `ISystemControl`,
//!   `IRemovableStorage`
//! - **Configuration** - the typed view of the device's `config.json`
//!
//! # Architecture
//!
//! This crate follows the hexagonal (ports & adapters) architecture pattern.
//! The domain module contains pure logic with no hardware or network
//! dependencies. Ports define trait interfaces that the adapter crates
//! (`ecopod-hal`, `ecopod-capture`, `ecopod-gcs`) implement; the
//! orchestration engine (`ecopod-engine`) consumes the ports only.

pub mod config;
pub mod domain;
pub mod ports;
