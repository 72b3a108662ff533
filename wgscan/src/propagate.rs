use rayon::prelude::*;

use super::operator::{Element, Operator};

/// Folds each block's prefix into its locally scanned elements.
///
/// `offsets[b]` is the exclusive prefix of block `b`. Block 0 of an
/// inclusive scan needs no correction. For an exclusive scan the first slot
/// of each block holds the identity, so it is overwritten by the offset.
pub fn propagate_blocks<T: Element>(
    data: &mut [T],
    offsets: &[T],
    block_size: usize,
    inclusive: bool,
    op: &Operator<T>,
) {
    debug_assert_eq!(offsets.len(), data.len().div_ceil(block_size));

    data.par_chunks_mut(block_size)
        .zip(offsets.par_iter())
        .enumerate()
        .for_each(|(index, (block, &offset))| {
            if inclusive {
                if index == 0 {
                    return;
                }
                for x in block.iter_mut() {
                    *x = op.combine(offset, *x);
                }
            } else if let Some((first, rest)) = block.split_first_mut() {
                *first = offset;
                for x in rest.iter_mut() {
                    *x = op.combine(offset, *x);
                }
            }
        });
}
