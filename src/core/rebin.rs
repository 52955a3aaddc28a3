//! INTERP (resolution change) and SHRINK (tail truncation).

use tracing::{debug, warn};

use crate::core::convolution_state::ConvolutionState;
use crate::core::density::occupied_range;
use crate::core::{ConvolutionError, Result};

/// SHRINK never removes more than this share of the total mass.
pub const SHRINK_MAX_LOSS: f64 = 0.5;

impl ConvolutionState {
    /// INTERP: move `F` onto the grid with `new_n2` bins per doubling.
    ///
    /// Each bin's mass is split linearly (in dose) between the two
    /// destination bins around its dose, so total mass and mean dose are
    /// kept. The spike is not touched.
    pub fn interp(&mut self, new_n2: u32) -> Result<()> {
        if new_n2 == 0 {
            return Err(ConvolutionError::invalid("n2 must be at least 1"));
        }
        let from = self.space;
        if new_n2 == from.n2() {
            return Ok(());
        }
        let to = from.with_bins_per_doubling(new_n2);

        self.e.fill(0.0);
        for i in self.mif..=self.lef {
            let w = self.f[i];
            if w == 0.0 {
                continue;
            }
            let (lo, frac) = to
                .bracket(from.dose_at(i))
                .ok_or(ConvolutionError::NumericalDegeneracy("bin below the grid anchor"))?;
            let hi = if frac > 0.0 { lo + 1 } else { lo };
            if hi >= self.array_size {
                return Err(ConvolutionError::CapacityExceeded {
                    required: hi + 1,
                    capacity: self.array_size,
                });
            }
            self.e[lo] += w * (1.0 - frac);
            if frac > 0.0 {
                self.e[hi] += w * frac;
            }
        }
        for v in &mut self.e {
            *v = v.max(0.0);
        }

        std::mem::swap(&mut self.f, &mut self.e);
        self.e.fill(0.0);
        let (mif, lef) = occupied_range(&self.f, 0, self.array_size - 1).unwrap_or((0, 0));
        self.mif = mif;
        self.lef = lef;
        self.space = to;
        self.table.clear();
        debug!(target: "sc", from = from.n2(), to = new_n2, mif, lef, "interp");
        Ok(())
    }

    /// SHRINK: drop tail bins holding at most `shrink_tails_under` of the
    /// total mass, from both ends. No-op unless `shrink_tails` is set.
    pub fn shrink(&mut self) -> Result<()> {
        if !self.options.shrink_tails {
            return Ok(());
        }
        let total = self.total_mass();
        if !(total > 0.0) || !total.is_finite() {
            return Err(ConvolutionError::NumericalDegeneracy(
                "cannot shrink an all-zero histogram",
            ));
        }
        let mut under = self.options.shrink_tails_under.max(0.0);
        if under > SHRINK_MAX_LOSS {
            warn!(
                "shrink_tails_under={} capped at {SHRINK_MAX_LOSS}",
                self.options.shrink_tails_under
            );
            under = SHRINK_MAX_LOSS;
        }
        let budget = under * total;

        let (mut lo, mut hi) = (self.mif, self.lef);
        let mut removed = 0.0;
        while lo < hi && removed + self.f[lo] <= budget {
            removed += self.f[lo];
            self.f[lo] = 0.0;
            lo += 1;
        }
        while hi > lo && removed + self.f[hi] <= budget {
            removed += self.f[hi];
            self.f[hi] = 0.0;
            hi -= 1;
        }
        if (lo, hi) != (self.mif, self.lef) {
            debug!(
                target: "sc",
                mif = lo,
                lef = hi,
                cut = (lo - self.mif) + (self.lef - hi),
                removed,
                "shrink"
            );
        }
        self.mif = lo;
        self.lef = hi;
        Ok(())
    }
}
