//! Alert gating between detectors and the notifier

pub mod signal_filter;

pub use signal_filter::CooldownGate;
