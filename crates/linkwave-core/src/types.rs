//! Common scalar types shared by every layer.

/// A single real-valued waveform sample.
pub type Sample = f64;

/// A single bit, stored as `0` or `1`.
pub type Bit = u8;

/// 8-bit link-layer address of a host or router.
pub type Address = u8;

/// Logical simulation time in seconds.
///
/// Time only advances when the simulation driver moves the clock; nothing in
/// this crate reads the wall clock.
pub type SimTime = f64;
