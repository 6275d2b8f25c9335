pub mod case;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod dispense;
pub mod kiosk;
pub mod logging;
pub mod protocol;
pub mod server;
pub mod triage;
