//! End-to-end scenario tests, one per named scenario: each drives the
//! public surface of a subsystem against an in-memory mock the way a
//! single-module unit test would, but exercises the whole path (format ->
//! commit -> remount, or version -> attach -> walk -> read) rather than one
//! function at a time. Kept as a `#[cfg(test)]`-only module rather than a
//! `tests/` integration crate: this crate is `no_std` outside of `cfg(test)`
//! builds, which a separate integration-test binary would not inherit.
