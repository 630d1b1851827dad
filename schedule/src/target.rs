//! Machine model.
//!
//! Tuning knobs describing the host machine, not a wire format. The
//! defaults mirror a small multicore CPU with 256-bit vectors and a tiny
//! per-core fast-memory budget.

use mosaic_dtype::DType;

/// Machine parameters the search optimizes against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineParams {
    /// Number of cores worth of outer-loop parallelism to aim for.
    pub parallelism: u32,
    /// Vector lanes, calibrated in 32-bit elements.
    pub vec_len: u32,
    /// Fast-memory budget in bytes for a group's intermediates.
    pub fast_mem_size: u64,
    /// Weight of memory cost against arithmetic cost in fusion decisions.
    pub balance: u32,
}

impl Default for MachineParams {
    fn default() -> Self {
        Self { parallelism: 16, vec_len: 8, fast_mem_size: 1024, balance: 10 }
    }
}

/// Compilation target: machine parameters plus derived queries.
#[derive(Debug, Clone, Copy, Default)]
pub struct Target {
    pub params: MachineParams,
}

impl Target {
    pub fn new(params: MachineParams) -> Self {
        Self { params }
    }

    /// Vector width for a type: `vec_len` counts 32-bit lanes, so narrower
    /// types pack more elements and wider types fewer, never below one.
    pub fn natural_vector_size(&self, dtype: DType) -> i64 {
        let lanes = i64::from(self.params.vec_len) * 4 / i64::from(dtype.bytes());
        lanes.max(1)
    }
}
