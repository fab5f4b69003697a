//! ecoscale-autoscale: energy-efficiency driven replica scaling.
//!
//! Each tick takes one snapshot set from a `SnapshotSource`, then walks the
//! configured services in order: read the authoritative replica count,
//! evaluate the policy, apply the decision, log the outcome.
//!
//! # Scaling Algorithm
//!
//! ```text
//! efficiency = rps / power_watts            (0 when power is 0)
//!
//! if efficiency < low_threshold and replicas < max:
//!     ScaleUp(replicas + 1)
//!
//! if efficiency > high_threshold and rps < rps_down_threshold and replicas > min:
//!     ScaleDown(replicas - 1)
//!
//! otherwise NoChange
//! ```
//!
//! Steps are always a single replica. A service whose replica read fails
//! is evaluated as if it ran one replica. Failed writes are logged and
//! retried implicitly by the next tick.

pub mod policy;
pub mod scaler;

pub use policy::ScalingPolicy;
pub use scaler::{Autoscaler, ScaleAction, ScaleOutcome};
