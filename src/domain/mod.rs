// Domain layer: parameter sets, simulation results and the Compute Studio client port.
// No axum or reqwest types here.

pub mod model;
pub mod ports;
