//! Windows-only native layers: DXGI adapters and PDH counters

pub mod dxgi;
pub mod pdh;
