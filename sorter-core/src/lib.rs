#![no_std]

// Shared logic for the color sorter.
//
// This crate stays portable across the MCU firmware and the host emulator by
// avoiding the Rust standard library. Hardware access happens only through the
// traits exposed here (`BusHardware`, `DebounceHardware`, the collaborator
// traits in `scheduler`), so every state machine can be exercised on the host.

#[macro_use]
mod fmt;

pub mod board;
pub mod bus;
pub mod config;
pub mod debounce;
pub mod devices;
pub mod events;
pub mod platform;
pub mod repl;
pub mod scheduler;
pub mod telemetry;
