pub mod location;
pub mod report;
pub mod station;

/// Identifies a vehicle (robot) of the fleet.
pub type VehicleId = i64;
