// Domain layer: value types, ports and the artifact lifecycle. No HTTP or filesystem code here.

pub mod artifact;
pub mod model;
pub mod ports;
