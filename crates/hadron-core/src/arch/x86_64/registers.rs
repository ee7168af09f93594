//! CPU register access: control registers, MSRs, and RFLAGS.

pub mod control;
pub mod model_specific;
pub mod rflags;
