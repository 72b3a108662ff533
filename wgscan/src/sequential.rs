use super::operator::{Element, Operator};
use super::scan::ScanMode;

/// Single-accumulator left-to-right scan, in place.
///
/// Base case of the parallel pipeline and the reference every other path
/// has to agree with.
pub fn scan_sequential<T: Element>(data: &mut [T], mode: ScanMode<T>, op: &Operator<T>) {
    match mode {
        ScanMode::Inclusive => {
            let mut iter = data.iter_mut();
            if let Some(first) = iter.next() {
                let mut acc = *first;
                for x in iter {
                    acc = op.combine(acc, *x);
                    *x = acc;
                }
            }
        }
        ScanMode::Exclusive(init) => {
            let mut acc = init;
            for x in data.iter_mut() {
                let value = *x;
                *x = acc;
                acc = op.combine(acc, value);
            }
        }
    }
}
