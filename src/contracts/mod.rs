//! Contract message definitions

pub mod cw_xrpl;

pub use cw_xrpl::*;
