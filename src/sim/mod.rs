//! Deterministic simulation core
//!
//! Everything that decides a race lives here and must stay pure and
//! deterministic:
//! - Fixed timestep only
//! - Seeded RNG only, threaded explicitly
//! - Stable iteration order (by marble index)
//! - No rendering, I/O or platform dependencies

pub mod collision;
pub mod field;
pub mod marble;
pub mod noise;
pub mod race;
pub mod terrain;
pub mod zones;

pub use collision::{resolve_boundary, resolve_marble_collisions, resolve_terrain_collision};
pub use field::HeightField;
pub use marble::{Marble, marble_colors};
pub use noise::{octave_noise, value_noise};
pub use race::{RacePhase, RaceResult, RaceSimulation};
pub use terrain::{Obstacle, TerrainGenerator, TerrainObstacle};
pub use zones::{Zone, ZoneKind, ZoneValidator};
