//! Deterministic simulation module
//!
//! All bike physics lives here. This module must be pure and deterministic:
//! - Fixed timestep only
//! - Seeded RNG only
//! - Stable iteration order (bodies and joints by creation order)
//! - No rendering, sound or platform dependencies; ticks return events

pub mod collision;
pub mod controller;
pub mod interpolate;
pub mod puppet;
pub mod rig;
pub mod serialize;
pub mod somersault;
pub mod state;
pub mod tick;
pub mod world;

pub use collision::{CollisionSurface, Contact, Segment, SegmentLevel};
pub use controller::{BikeInput, Controller};
pub use interpolate::{
    InterpolationMode, choose_interpolation, interpolate_game_state, interpolate_game_state_cubic,
    interpolate_game_state_linear,
};
pub use puppet::NetPuppet;
pub use rig::{BikeAnchors, BikeParameters, BikeRig, RiderAnchors, RiderJoints};
pub use serialize::SerializedBikeState;
pub use somersault::SomersaultCounter;
pub use state::{BikeState, BikerEvent, DriveDir, RiderPose, Side, Wheel};
pub use tick::{ExternalForce, PlayerBiker};
pub use world::{BodyId, HingeLimits, JointId, MassShape, World, spring_from_erp_cfm};
