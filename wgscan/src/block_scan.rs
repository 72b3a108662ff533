use rayon::prelude::*;

use super::operator::{Element, Operator};

/// Scans one block in place and returns its aggregate.
///
/// Inclusive: `block[i]` becomes the fold of `block[..=i]`.
/// Exclusive: `block[0]` becomes the identity and `block[i]` the fold of
/// `block[..i]`. The aggregate is the fold of the whole block either way.
/// `block` must not be empty.
pub fn scan_block<T: Element>(block: &mut [T], inclusive: bool, op: &Operator<T>) -> T {
    let (first, rest) = match block.split_first_mut() {
        Some(split) => split,
        None => return op.identity(),
    };

    let mut acc = *first;
    if inclusive {
        for x in rest.iter_mut() {
            acc = op.combine(acc, *x);
            *x = acc;
        }
    } else {
        *first = op.identity();
        for x in rest.iter_mut() {
            let value = *x;
            *x = acc;
            acc = op.combine(acc, value);
        }
    }
    acc
}

/// Runs [`scan_block`] over every `block_size` chunk in parallel.
///
/// Returns one aggregate per block, in block order. Blocks never look at
/// each other; collecting the aggregates is the barrier before the
/// aggregate scan.
pub fn scan_blocks<T: Element>(
    data: &mut [T],
    block_size: usize,
    inclusive: bool,
    op: &Operator<T>,
) -> Vec<T> {
    data.par_chunks_mut(block_size)
        .map(|block| scan_block(block, inclusive, op))
        .collect()
}
