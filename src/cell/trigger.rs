//! AOI trigger record, the integration contract with the spatial index.
//!
//! The range tree itself lives outside of this crate: it reads the installed
//! triggers and, whenever an entity crosses the disc, invokes
//! [`Witness::on_enter_aoi`] or [`Witness::on_leave_aoi`] on the owning
//! witness. Enter/leave damping is handled by the index's hysteresis band
//! around the disc, not by a second radius here.
//!
//! [`Witness::on_enter_aoi`]: super::witness::Witness::on_enter_aoi
//! [`Witness::on_leave_aoi`]: super::witness::Witness::on_leave_aoi

use super::entity::EntityId;


/// A trigger disc bound to the range-tree node of its origin entity.
#[derive(Debug, Clone)]
pub struct AoiTrigger {
    /// The entity whose node the disc is centered on.
    origin: EntityId,
    inner_radius: f32,
    outer_radius: f32,
    installed: bool,
}

impl AoiTrigger {

    /// Create a new trigger, not yet installed in the spatial index.
    pub fn new(origin: EntityId, inner_radius: f32, outer_radius: f32) -> Self {
        Self {
            origin,
            inner_radius,
            outer_radius,
            installed: false,
        }
    }

    #[inline]
    pub fn origin(&self) -> EntityId {
        self.origin
    }

    /// Rebind the disc to another origin node, used when the viewer enters a
    /// new space.
    pub fn set_origin(&mut self, origin: EntityId) {
        self.origin = origin;
    }

    #[inline]
    pub fn range(&self) -> (f32, f32) {
        (self.inner_radius, self.outer_radius)
    }

    pub fn set_range(&mut self, inner_radius: f32, outer_radius: f32) {
        self.inner_radius = inner_radius;
        self.outer_radius = outer_radius;
    }

    pub fn install(&mut self) {
        self.installed = true;
    }

    pub fn uninstall(&mut self) {
        self.installed = false;
    }

    #[inline]
    pub fn is_installed(&self) -> bool {
        self.installed
    }

}
