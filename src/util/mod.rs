//! Utility helpers.

pub mod size;
