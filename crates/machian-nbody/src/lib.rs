//! P3M N-body gravity engine.
//!
//! Long-range forces come from an FFT Poisson solve on a periodic mesh;
//! a direct pairwise pass inside a cutoff radius restores the short-range
//! `1/r^2` behavior the mesh smooths away. A symplectic leapfrog advances
//! the particle state. The pairwise pass runs on the GPU when a device is
//! available, with logged per-session fallback to an equivalent CPU
//! implementation.

pub mod backend;
pub mod engine;
pub mod gpu;
pub mod mesh;
pub mod particles;
pub mod short_range;

pub use backend::{Accel, CpuBackend, Device, ForceBackend};
pub use engine::{Frame, NBodyEngine, P3mParams};
pub use gpu::GpuError;
pub use particles::ParticleSystem;
