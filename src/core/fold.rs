//! FOLD: self-convolution of the working histogram on the log2 dose grid.
//!
//! Two point masses at `d(i)` and `d(j)`, `j = i + k`, sum to
//! `d(i) * (1 + 2^(k / N2))`. The destination therefore sits a fixed
//! number of bins above `i` for a given offset `k`, and the linear split
//! between the two bracketing bins does not depend on `i` either. Both
//! are tabulated once per fold in [`FoldTable`].

use tracing::trace;

use crate::core::convolution_state::ConvolutionState;
use crate::core::density::occupied_range;
use crate::core::log2space::snap;
use crate::core::{ConvolutionError, Result};

/// Per-offset destination shift `di[k]` and split weights `a[k]` (lower
/// bin) and `bi[k]` (upper bin), `a[k] + bi[k] == 1`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FoldTable {
    n2: u32,
    pub di: Vec<usize>,
    pub a: Vec<f64>,
    pub bi: Vec<f64>,
}

impl FoldTable {
    /// Table for offsets `0..=span` at resolution `n2`.
    pub fn build(n2: u32, span: usize) -> Self {
        let mut table = Self::default();
        table.ensure(n2, span);
        table
    }

    /// Extend (or rebuild on a resolution change) to cover `0..=span`.
    pub fn ensure(&mut self, n2: u32, span: usize) {
        if self.n2 != n2 {
            self.clear();
            self.n2 = n2;
        }
        for k in self.di.len()..=span {
            let (m, a, b) = Self::entry(n2, k);
            self.di.push(m);
            self.a.push(a);
            self.bi.push(b);
        }
    }

    pub fn clear(&mut self) {
        self.n2 = 0;
        self.di.clear();
        self.a.clear();
        self.bi.clear();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.di.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.di.is_empty()
    }

    fn entry(n2: u32, k: usize) -> (usize, f64, f64) {
        let step = 1.0 / n2 as f64;
        let ratio = 1.0 + (k as f64 * step).exp2();
        let pos = snap(n2 as f64 * ratio.log2());
        let m = pos.floor();
        if pos == m {
            return (m as usize, 1.0, 0.0);
        }
        let lower = (m * step).exp2();
        let upper = ((m + 1.0) * step).exp2();
        let frac = ((ratio - lower) / (upper - lower)).clamp(0.0, 1.0);
        (m as usize, 1.0 - frac, frac)
    }
}

impl ConvolutionState {
    /// FOLD: `H` becomes the distribution of the sum of two independent
    /// draws from `(F0, F)`. Expects a preceding [`zero`](Self::zero);
    /// `F` is left untouched, see [`merge`](Self::merge).
    pub fn fold(&mut self) -> Result<()> {
        let n2 = self.space.n2() as usize;
        let (mif, lef) = (self.mif, self.lef);
        if lef + n2 >= self.array_size {
            return Err(ConvolutionError::CapacityExceeded {
                required: lef + n2 + 1,
                capacity: self.array_size,
            });
        }
        self.table.ensure(self.space.n2(), lef - mif);

        let f0 = self.f0;
        self.h0 = f0 * f0;
        for i in mif..=lef {
            let fi = self.f[i];
            if fi == 0.0 {
                continue;
            }
            // One draw hits nothing: the other lands unshifted.
            self.h[i] += 2.0 * f0 * fi;
            for j in i..=lef {
                let fj = self.f[j];
                if fj == 0.0 {
                    continue;
                }
                let k = j - i;
                let w = if k == 0 { fi * fi } else { 2.0 * fi * fj };
                let lo = i + self.table.di[k];
                self.h[lo] += w * self.table.a[k];
                let b = self.table.bi[k];
                if b > 0.0 {
                    self.h[lo + 1] += w * b;
                }
            }
        }

        let (mih, leh) = occupied_range(&self.h, mif, lef + n2).unwrap_or((mif, mif));
        self.mih = mih;
        self.leh = leh;
        trace!(target: "sc", mif, lef, mih, leh, h0 = self.h0, "fold");
        Ok(())
    }
}
