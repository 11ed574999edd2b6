//! Stateless physics engines for the Machian lab backend.
//!
//! Every engine here is a pure function of a validated request: no shared
//! state, no I/O, unbounded call parallelism. The stateful N-body engine
//! lives in `machian-nbody`; the network surface in `machian-server`.

pub mod constants;
pub mod cosmology;
pub mod error;
pub mod geodesic;
pub mod params;
pub mod rotation;

pub use error::{Error, Result};
pub use params::{InfallRequest, LookbackRequest, NBodyRequest, RotationRequest};
pub use rotation::GalaxyProfile;
