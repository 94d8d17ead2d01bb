//! Constant-time digest comparison.

/// Compare a candidate digest with the stored one.
///
/// Length is not secret and short-circuits. For equal lengths every byte pair
/// is folded into the accumulator before the result is produced, so the
/// position of the first difference does not affect the running time.
#[must_use]
pub fn verify(candidate: &str, stored: &str) -> bool {
    let (candidate, stored) = (candidate.as_bytes(), stored.as_bytes());
    if candidate.len() != stored.len() {
        return false;
    }

    let fold = xor_fold(candidate, stored);
    debug_assert_eq!(fold.compared, stored.len());
    fold.difference == 0
}

struct Fold {
    difference: u8,
    compared: usize,
}

// Callers guarantee equal lengths.
#[inline(never)]
fn xor_fold(a: &[u8], b: &[u8]) -> Fold {
    let mut difference = 0u8;
    let mut compared = 0usize;
    for (x, y) in a.iter().zip(b) {
        difference |= std::hint::black_box(x ^ y);
        compared += 1;
    }
    Fold {
        difference,
        compared,
    }
}
