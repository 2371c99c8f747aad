//! Cell server configuration consumed by witnesses.

use serde::Deserialize;


/// Static configuration of a cell process, threaded into each witness at
/// construction so the replication core stays testable in isolation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CellConfig {
    /// When disabled, no AOI trigger is maintained and radius changes are
    /// ignored altogether.
    pub use_coordinate_system: bool,
    /// AOI radius installed when a witness attaches.
    pub default_aoi_radius: f32,
    /// Hysteresis band installed when a witness attaches, damping the
    /// enter/leave churn at the disc's edge.
    pub default_aoi_hysteresis: f32,
    /// Cell-level cap on the replication radius, the AOI disc plus its
    /// hysteresis must fit strictly inside.
    pub ghost_distance: f32,
    /// Allow 8-bit alias ids on the wire whenever a membership fits in one.
    pub entity_alias_id: bool,
}

impl Default for CellConfig {
    fn default() -> Self {
        Self {
            use_coordinate_system: true,
            default_aoi_radius: 80.0,
            default_aoi_hysteresis: 5.0,
            ghost_distance: 500.0,
            entity_alias_id: true,
        }
    }
}
