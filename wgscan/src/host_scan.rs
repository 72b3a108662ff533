use super::block_scan::scan_blocks;
use super::operator::{Element, Operator};
use super::propagate::propagate_blocks;
use super::scan::{ScanMode, Strategy};
use super::sequential::scan_sequential;

/// Three-phase scan on the host thread pool, in place.
///
/// The aggregate scan recurses through the same strategy selection, so it
/// bottoms out in a sequential sweep once the aggregate sequence is short.
pub fn scan_host<T: Element>(
    data: &mut [T],
    mode: ScanMode<T>,
    op: &Operator<T>,
    block_size: usize,
    sequential_threshold: usize,
) {
    match Strategy::select(data.len(), sequential_threshold, Some(block_size)) {
        Strategy::Sequential => scan_sequential(data, mode, op),
        Strategy::Parallel { block_size } => {
            let inclusive = mode.is_inclusive();
            let mut offsets = scan_blocks(data, block_size, inclusive, op);

            log::trace!(
                "host level: {} elements, {} blocks of {}",
                data.len(),
                offsets.len(),
                block_size
            );

            let seed = mode.seed_or(op.identity());
            scan_host(
                &mut offsets,
                ScanMode::Exclusive(seed),
                op,
                block_size,
                sequential_threshold,
            );

            propagate_blocks(data, &offsets, block_size, inclusive, op);
        }
    }
}
