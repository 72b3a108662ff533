//! Parallel prefix sums (scans) on the host thread pool or a wgpu device.
//!
//! Large inputs are split into fixed-size blocks that are scanned
//! independently, the block aggregates are scanned recursively, and each
//! block's prefix is folded back into it. Small inputs take a plain
//! sequential sweep; both paths give the same result.

pub mod block_scan;
pub mod config;
pub mod context;
pub mod control;
pub mod device_scan;
pub mod device_vec;
pub mod error;
pub mod host_scan;
pub mod operator;
pub mod propagate;
pub mod scan;
pub mod sequential;

pub use self::config::*;
pub use self::context::*;
pub use self::control::*;
pub use self::device_scan::*;
pub use self::device_vec::*;
pub use self::error::*;
pub use self::operator::*;
pub use self::scan::*;
