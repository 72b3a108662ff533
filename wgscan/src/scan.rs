//! Public scan entry points and the sequential/parallel dispatch.
//!
//! ```
//! use wgscan::{exclusive_scan, inclusive_scan};
//!
//! let input = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10];
//! let mut output = [0; 10];
//!
//! inclusive_scan(&input, &mut output).unwrap();
//! assert_eq!(output, [1, 3, 6, 10, 15, 21, 28, 36, 45, 55]);
//!
//! exclusive_scan(&input, &mut output, 0).unwrap();
//! assert_eq!(output, [0, 1, 3, 6, 10, 15, 21, 28, 36, 45]);
//! ```

use super::config::FallbackPolicy;
use super::control::{Control, Executor};
use super::device_scan::DeviceScan;
use super::error::ScanError;
use super::host_scan::scan_host;
use super::operator::{Element, Operator};
use super::sequential::scan_sequential;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanMode<T> {
    Inclusive,
    Exclusive(T),
}

impl<T: Copy> ScanMode<T> {
    pub fn is_inclusive(&self) -> bool {
        matches!(self, ScanMode::Inclusive)
    }

    /// The exclusive init, or `identity` for an inclusive scan.
    pub fn seed_or(&self, identity: T) -> T {
        match *self {
            ScanMode::Inclusive => identity,
            ScanMode::Exclusive(init) => init,
        }
    }
}

/// How one call (or one recursion level) is executed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    Sequential,
    Parallel { block_size: usize },
}

impl Strategy {
    /// `block_size` is `None` when no parallel executor is configured.
    ///
    /// Fewer than two elements are always sequential, which is what ends
    /// the aggregate recursion.
    pub fn select(len: usize, sequential_threshold: usize, block_size: Option<usize>) -> Self {
        match block_size {
            Some(block_size) if len >= 2 && len > sequential_threshold => {
                Strategy::Parallel { block_size }
            }
            _ => Strategy::Sequential,
        }
    }
}

enum Plan<'a, T: Element> {
    Sequential,
    Host { block_size: usize },
    Device(DeviceScan<'a, T>),
}

/// Resolves everything that can fail before any output is written.
fn prepare<'a, T: Element>(
    ctl: &'a Control,
    len: usize,
    op: &Operator<T>,
) -> Result<Plan<'a, T>, ScanError> {
    let config = &ctl.config;
    config.validate()?;

    let strategy = Strategy::select(len, config.sequential_threshold, ctl.parallel_block_size());
    log::debug!("scan of {} elements with `{}`: {:?}", len, op.name(), strategy);

    let block_size = match strategy {
        Strategy::Sequential => return Ok(Plan::Sequential),
        Strategy::Parallel { block_size } => block_size,
    };

    match &ctl.executor {
        Executor::Sequential => Ok(Plan::Sequential),
        Executor::Host => Ok(Plan::Host { block_size }),
        Executor::Device(context) => {
            let prepared = DeviceScan::new(context, op, config).and_then(|scan| {
                scan.check_len(len)?;
                Ok(scan)
            });
            match prepared {
                Ok(scan) => Ok(Plan::Device(scan)),
                Err(ScanError::ExecutorUnavailable(reason))
                    if config.fallback == FallbackPolicy::Sequential =>
                {
                    log::warn!("{}; scanning sequentially instead", reason);
                    Ok(Plan::Sequential)
                }
                Err(err) => Err(err),
            }
        }
    }
}

fn run_host<T: Element>(
    plan: &Plan<'_, T>,
    ctl: &Control,
    data: &mut [T],
    mode: ScanMode<T>,
    op: &Operator<T>,
) {
    match plan {
        Plan::Host { block_size } => {
            scan_host(data, mode, op, *block_size, ctl.config.sequential_threshold)
        }
        _ => scan_sequential(data, mode, op),
    }
}

fn scan_into<T: Element>(
    ctl: &Control,
    input: &[T],
    output: &mut [T],
    mode: ScanMode<T>,
    op: &Operator<T>,
) -> Result<(), ScanError> {
    if output.len() < input.len() {
        return Err(ScanError::InvalidRange {
            input: input.len(),
            output: output.len(),
        });
    }
    let output = &mut output[..input.len()];

    let plan = prepare(ctl, input.len(), op)?;
    if let Plan::Device(scan) = &plan {
        return scan.scan_slice(input, output, mode);
    }

    output.copy_from_slice(input);
    run_host(&plan, ctl, output, mode, op);
    Ok(())
}

fn scan_in_place<T: Element>(
    ctl: &Control,
    data: &mut [T],
    mode: ScanMode<T>,
    op: &Operator<T>,
) -> Result<(), ScanError> {
    let plan = prepare(ctl, data.len(), op)?;
    if let Plan::Device(scan) = &plan {
        return scan.scan_in_place(data, mode);
    }

    run_host(&plan, ctl, data, mode, op);
    Ok(())
}

/// Running sum of `input`, inclusive of the current element, on the host pool.
///
/// `output` must hold at least `input.len()` elements; only that prefix is written.
pub fn inclusive_scan<T: Element>(input: &[T], output: &mut [T]) -> Result<(), ScanError> {
    inclusive_scan_with(&Control::default(), input, output, &Operator::Add)
}

/// `output[i]` = `op` folded over `input[..=i]`.
pub fn inclusive_scan_with<T: Element>(
    ctl: &Control,
    input: &[T],
    output: &mut [T],
    op: &Operator<T>,
) -> Result<(), ScanError> {
    scan_into(ctl, input, output, ScanMode::Inclusive, op)
}

pub fn inclusive_scan_in_place<T: Element>(
    ctl: &Control,
    data: &mut [T],
    op: &Operator<T>,
) -> Result<(), ScanError> {
    scan_in_place(ctl, data, ScanMode::Inclusive, op)
}

/// Running sum of `input` seeded with `init`, exclusive of the current element.
pub fn exclusive_scan<T: Element>(input: &[T], output: &mut [T], init: T) -> Result<(), ScanError> {
    exclusive_scan_with(&Control::default(), input, output, init, &Operator::Add)
}

/// `output[0]` = `init`, `output[i]` = `op` folded over `input[..i]` starting from `init`.
pub fn exclusive_scan_with<T: Element>(
    ctl: &Control,
    input: &[T],
    output: &mut [T],
    init: T,
    op: &Operator<T>,
) -> Result<(), ScanError> {
    scan_into(ctl, input, output, ScanMode::Exclusive(init), op)
}

pub fn exclusive_scan_in_place<T: Element>(
    ctl: &Control,
    data: &mut [T],
    init: T,
    op: &Operator<T>,
) -> Result<(), ScanError> {
    scan_in_place(ctl, data, ScanMode::Exclusive(init), op)
}
