//! Emotion Engine side: MIPS-III core, COP0/FPU, DMAC, timers.

pub mod cop0;
pub mod cpu;
pub mod dmac;
pub mod fpu;
pub mod timer;
