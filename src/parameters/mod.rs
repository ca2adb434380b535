mod fixed;
pub use fixed::{FixedParameters, ModelParameters, ModelValue};

mod kind;
pub use kind::{AxisSpacing, CollisionPartner, Geometry, OperatingRange, PhysicalParameter};

mod spec;
pub use spec::{FitConfiguration, FitParameter, ParameterSpec};
