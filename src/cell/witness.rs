//! The witness: per-entity AOI replicator.
//!
//! A witness is bound to one viewer entity with a connected client. It tracks
//! the entities inside the viewer's AOI disc through the spatial trigger
//! callbacks, and once per tick encodes an incremental update frame into the
//! client channel: the viewer's own base position first, then enter-world,
//! leave-world and volatile deltas for the membership, in insertion order,
//! under the hard per-packet byte budget.

use std::cell::RefCell;
use std::rc::Rc;

use glam::Vec3;
use thiserror::Error;
use tracing::{debug, error, trace_span, warn};

use crate::net::bundle::Bundle;
use crate::net::channel::{Channel, PACKET_MAX_SIZE_TCP};
use crate::net::client::{self, WireEntityId};
use crate::net::element::ElementLength;
use crate::util::io::CellWriteExt;

use super::config::CellConfig;
use super::entity::{EntityId, EntityRegistry};
use super::member::{flags, AoiMembership, EntityRef};
use super::tick::{GameTime, Scheduler};
use super::trigger::AoiTrigger;
use super::volatile::{update_data_message_id, write_volatile_data};


/// Safety margin kept between the AOI outer edge and the ghost distance.
pub const AOI_GHOST_MARGIN: f32 = 5.0;

/// Minimum movement of the viewer before a new base position is sent.
const BASE_POS_MIN_MOVEMENT: f32 = 0.0004;


/// Errors of the witness lifecycle.
#[derive(Debug, Error)]
pub enum WitnessError {
    #[error("witness is already attached to entity #{0}")]
    AlreadyAttached(EntityId),
}


/// The per-entity AOI replicator.
pub struct Witness {
    /// Cell configuration, threaded in at construction.
    config: Rc<CellConfig>,
    /// The viewer entity this witness replicates for, present while attached.
    viewer: Option<EntityId>,
    aoi_radius: f32,
    aoi_hysteresis: f32,
    /// Present iff the radius is positive and the coordinate system enabled.
    trigger: Option<AoiTrigger>,
    /// Base position of the last frame. Every component starts at −∞ so the
    /// first tick always emits a full base position.
    last_base_pos: Vec3,
    membership: AoiMembership,
}

impl Witness {

    pub fn new(config: Rc<CellConfig>) -> Self {
        Self {
            config,
            viewer: None,
            aoi_radius: 0.0,
            aoi_hysteresis: 5.0,
            trigger: None,
            last_base_pos: Vec3::splat(f32::NEG_INFINITY),
            membership: AoiMembership::new(),
        }
    }

    #[inline]
    pub fn viewer(&self) -> Option<EntityId> {
        self.viewer
    }

    #[inline]
    pub fn aoi_radius(&self) -> f32 {
        self.aoi_radius
    }

    #[inline]
    pub fn aoi_hysteresis(&self) -> f32 {
        self.aoi_hysteresis
    }

    #[inline]
    pub fn trigger(&self) -> Option<&AoiTrigger> {
        self.trigger.as_ref()
    }

    #[inline]
    pub fn membership(&self) -> &AoiMembership {
        &self.membership
    }

    /// Bind this witness to its viewer and register it for per-tick updates.
    /// When the coordinate system is enabled this also installs the default
    /// AOI disc from the configuration.
    pub fn attach(&mut self, scheduler: &mut Scheduler, viewer: EntityId) -> Result<(), WitnessError> {

        if let Some(attached) = self.viewer {
            return Err(WitnessError::AlreadyAttached(attached));
        }

        debug!("witness attach: entity #{viewer}");

        self.viewer = Some(viewer);
        self.last_base_pos = Vec3::splat(f32::NEG_INFINITY);

        if self.config.use_coordinate_system {
            let radius = self.config.default_aoi_radius;
            let hysteresis = self.config.default_aoi_hysteresis;
            self.set_aoi_radius(radius, hysteresis);
        }

        scheduler.add(viewer);
        Ok(())

    }

    /// Tear this witness down: every witnessed target forgets the viewer, all
    /// membership records are destroyed and the witness is deregistered from
    /// the scheduler. The viewer must match the attached one.
    pub fn detach(&mut self, registry: &mut EntityRegistry, scheduler: &mut Scheduler, viewer: EntityId) {

        assert_eq!(self.viewer, Some(viewer), "witness detached with a non-matching viewer");

        debug!("witness detach: entity #{viewer}");

        for entity_ref in self.membership.iter() {
            if let Some(handle) = entity_ref.handle() {
                if let Some(target) = registry.get_mut(handle) {
                    target.remove_witnessed_by(viewer);
                }
            }
        }

        self.membership.clear();
        self.viewer = None;
        self.aoi_radius = 0.0;
        self.aoi_hysteresis = 5.0;
        self.trigger = None;

        scheduler.remove(viewer);

    }

    /// Resize the AOI disc. The disc plus its hysteresis band is clamped
    /// under the ghost distance, and the trigger is created or updated with
    /// inner radius equal to outer radius, the hysteresis band being the
    /// trigger's concern.
    pub fn set_aoi_radius(&mut self, radius: f32, hysteresis: f32) {

        if !self.config.use_coordinate_system {
            return;
        }

        self.aoi_radius = radius;
        self.aoi_hysteresis = hysteresis;

        if self.aoi_radius + self.aoi_hysteresis > self.config.ghost_distance - AOI_GHOST_MARGIN {
            self.aoi_radius = self.config.ghost_distance - AOI_GHOST_MARGIN;
            self.aoi_hysteresis = AOI_GHOST_MARGIN;
        }

        if self.aoi_radius > 0.0 {
            let viewer = self.viewer.expect("aoi radius set on a detached witness");
            match &mut self.trigger {
                Some(trigger) => trigger.set_range(self.aoi_radius, self.aoi_radius),
                None => self.trigger = Some(AoiTrigger::new(viewer, self.aoi_radius, self.aoi_radius)),
            }
        }

    }

    /// Trigger callback: an entity crossed into the AOI disc.
    pub fn on_enter_aoi(&mut self, registry: &mut EntityRegistry, target: EntityId) {

        let viewer = self.viewer.expect("aoi callback on a detached witness");

        if let Some(index) = self.membership.position_by_handle(target)
            .or_else(|| self.membership.position_by_id(target))
        {
            let entity_ref = &mut self.membership[index];
            if entity_ref.has_flags(flags::LEAVE_CLIENT_PENDING) {
                // The leave was never transmitted: cancel it and restore the
                // live handle, the client state is already correct.
                debug!("witness on_enter_aoi: {viewer} entity={target}");
                entity_ref.remove_flags(flags::LEAVE_CLIENT_PENDING);
                entity_ref.set_handle(Some(target));
                if let Some(entity) = registry.get_mut(target) {
                    entity.add_witnessed_by(viewer);
                }
            } else if entity_ref.handle().is_none() {
                // Re-enter of a record whose untransmitted enter+leave pair
                // collapsed, before its scheduled drop.
                debug!("witness on_enter_aoi: {viewer} entity={target}");
                entity_ref.add_flags(flags::ENTER_CLIENT_PENDING);
                entity_ref.set_handle(Some(target));
                if let Some(entity) = registry.get_mut(target) {
                    entity.add_witnessed_by(viewer);
                }
            }
            // Otherwise a spurious duplicate enter, nothing to do.
            return;
        }

        debug!("witness on_enter_aoi: {viewer} entity={target}");

        let mut entity_ref = EntityRef::new(target, Some(target));
        entity_ref.add_flags(flags::ENTER_CLIENT_PENDING);
        self.membership.push(entity_ref);

        if let Some(entity) = registry.get_mut(target) {
            entity.add_witnessed_by(viewer);
        }

    }

    /// Trigger callback: an entity crossed out of the AOI disc. The record is
    /// kept in membership until the emission tick so the leave message can
    /// still reference it.
    pub fn on_leave_aoi(&mut self, registry: &mut EntityRegistry, target: EntityId) {
        let Some(index) = self.membership.position_by_id(target) else {
            return;
        };
        self.leave_ref(registry, index);
    }

    /// Internal leave path, shared by the trigger callback and the update
    /// walk when an enter-pending target turns out to be destroyed.
    fn leave_ref(&mut self, registry: &mut EntityRegistry, index: usize) {

        let viewer = self.viewer.expect("aoi callback on a detached witness");
        let entity_ref = &mut self.membership[index];

        debug!("witness on_leave_aoi: {viewer} entity={}", entity_ref.id());

        if entity_ref.has_flags(flags::ENTER_CLIENT_PENDING) {
            // The enter was never transmitted, so the client must not receive
            // a leave for an entity it has never seen. The record collapses
            // and is dropped on the next emission pass.
            entity_ref.remove_flags(flags::ENTER_CLIENT_PENDING);
        } else {
            entity_ref.add_flags(flags::LEAVE_CLIENT_PENDING);
        }

        if let Some(handle) = entity_ref.handle() {
            if let Some(entity) = registry.get_mut(handle) {
                entity.remove_witnessed_by(viewer);
            }
        }

        entity_ref.set_handle(None);

    }

    /// The viewer entered a space: send its own property frame and
    /// enter-world message, then install the AOI trigger at its node.
    pub fn on_enter_space(&mut self, registry: &EntityRegistry) {

        let Some(viewer_id) = self.viewer else {
            return;
        };
        let Some(viewer) = registry.get(viewer_id) else {
            return;
        };

        let mut bundle = Bundle::new();

        let mut data = Vec::new();
        // Writing to a vector cannot fail.
        viewer.add_position_and_direction_to_stream(&mut data).unwrap();
        bundle.add_element(&client::UpdateProperties { entity_id: viewer_id, data });
        bundle.add_element(&client::EntityEnterWorld {
            entity_id: viewer_id,
            entity_type_id: viewer.type_id(),
        });

        if let Some(mailbox) = viewer.client_mailbox() {
            mailbox.post_mail(bundle);
        }

        if let Some(trigger) = &mut self.trigger {
            trigger.set_origin(viewer_id);
            trigger.install();
        }

    }

    /// The viewer left its space: uninstall the AOI trigger and send its own
    /// leave-world message.
    pub fn on_leave_space(&mut self, registry: &EntityRegistry) {

        if let Some(trigger) = &mut self.trigger {
            trigger.uninstall();
        }

        let Some(viewer_id) = self.viewer else {
            return;
        };

        let mut bundle = Bundle::new();
        bundle.add_element(&client::EntityLeaveWorld { entity_id: viewer_id });

        if let Some(mailbox) = registry.get(viewer_id).and_then(|e| e.client_mailbox()) {
            mailbox.post_mail(bundle);
        }

    }

    /// The base position is the viewer's own position.
    pub fn base_pos(&self, registry: &EntityRegistry) -> Option<Vec3> {
        registry.get(self.viewer?).map(|e| e.position())
    }

    /// Resolve the viewer's client channel, `None` at any missing link.
    pub fn channel(&self, registry: &EntityRegistry) -> Option<Rc<RefCell<Channel>>> {
        let viewer = registry.get(self.viewer?)?;
        Some(viewer.client_mailbox()?.channel())
    }

    /// Queue a bundle onto the viewer's client channel. Without a channel the
    /// bundle is dropped, an error is reported and `false` returned.
    pub fn send_to_client(&self, registry: &EntityRegistry, bundle: Bundle) -> bool {
        match self.channel(registry) {
            Some(channel) => {
                channel.borrow_mut().push_bundle(bundle);
                true
            }
            None => {
                error!("witness send_to_client: no channel found for entity {:?}", self.viewer);
                false
            }
        }
    }

    /// Per-tick update: drain pending membership state into one frame bundle
    /// under the remaining packet budget, then flush the channel.
    ///
    /// Records that do not fit in the budget keep their pending flags and are
    /// retried on the next tick, in membership order, so every pending state
    /// is eventually delivered. Always returns `true` so the witness stays
    /// registered even while the viewer or its channel is missing.
    pub fn update(&mut self, registry: &mut EntityRegistry, now: GameTime) -> bool {

        let Some(viewer_id) = self.viewer else {
            return true;
        };
        let Some(viewer) = registry.get(viewer_id) else {
            return true;
        };
        let Some(mailbox) = viewer.client_mailbox() else {
            return true;
        };

        let channel = mailbox.channel();
        let viewer_pos = viewer.position();

        // Whatever does not fit this tick is pushed back to the next one.
        let mut remain = PACKET_MAX_SIZE_TCP as isize - channel.borrow().bundles_length() as isize;

        if remain > 0 {

            let mut bundle = Bundle::new();
            self.write_frame_prefix(&mut bundle, viewer_id);
            self.add_base_pos_to_bundle(&mut bundle, viewer_pos);

            let mut index = 0;
            while index < self.membership.len() {

                if remain <= 0 {
                    break;
                }

                let entity_ref = &self.membership[index];
                let ref_flags = entity_ref.flags();
                let target_id = entity_ref.id();
                let handle = entity_ref.handle();

                if ref_flags & flags::ENTER_CLIENT_PENDING != 0 {

                    // Re-resolve by id, the target may have been destroyed by
                    // a callback since it entered the disc.
                    let target = match registry.get(target_id) {
                        Some(target) => target,
                        None => {
                            self.leave_ref(registry, index);
                            self.membership.remove(index);
                            continue;
                        }
                    };

                    let mut data = Vec::new();
                    // Writing to a vector cannot fail.
                    target.add_position_and_direction_to_stream(&mut data).unwrap();
                    target.add_client_data_to_stream(&mut data).unwrap();

                    let enter_world = client::EntityEnterWorld {
                        entity_id: target_id,
                        entity_type_id: target.type_id(),
                    };

                    remain -= bundle.add_element(&client::UpdateProperties { entity_id: target_id, data }) as isize;
                    remain -= bundle.add_element(&enter_world) as isize;

                    self.membership[index].remove_flags(flags::ENTER_CLIENT_PENDING);

                } else if ref_flags & flags::LEAVE_CLIENT_PENDING != 0 {

                    self.membership[index].remove_flags(flags::LEAVE_CLIENT_PENDING);
                    remain -= self.add_smart_leave_message(&mut bundle, target_id) as isize;
                    self.membership.remove(index);
                    continue;

                } else {

                    // Steady state: a dead handle is dropped silently, the
                    // client state is fixed by the membership geometry alone.
                    let target = match handle {
                        Some(handle) => match registry.get(handle) {
                            Some(target) => target,
                            None => {
                                self.membership.remove(index);
                                continue;
                            }
                        },
                        None => {
                            self.membership.remove(index);
                            continue;
                        }
                    };

                    let mut data = Vec::new();
                    // Writing to a vector cannot fail.
                    self.write_entity_id(&mut data, target_id).unwrap();
                    let volatile_flags = write_volatile_data(&mut data, viewer_pos, target, now).unwrap();

                    let message_id = update_data_message_id(volatile_flags);
                    remain -= bundle.add_element_raw(message_id, ElementLength::Variable8, &data) as isize;

                }

                index += 1;

            }

            if bundle.len() > PACKET_MAX_SIZE_TCP {
                warn!("witness update({viewer_id}): send bundle size = {}", bundle.len());
            }

            if !bundle.is_empty() {
                channel.borrow_mut().push_bundle(bundle);
            }

        }

        {
            // Slow or blocked clients show up in this span.
            let _span = trace_span!("update_client_send", entity = viewer_id).entered();
            channel.borrow_mut().send();
        }

        true

    }

    /// Write the frame prefix announcing whose frame this is, the viewer is
    /// always alias 0 when aliases are usable.
    fn write_frame_prefix(&self, bundle: &mut Bundle, viewer_id: EntityId) {
        if self.aliases_usable() {
            bundle.add_element(&client::SelectAliasedEntity { alias: 0 });
        } else {
            bundle.add_element(&client::SelectEntity { entity_id: viewer_id });
        }
    }

    /// Emit the viewer's base position when it moved since the last frame.
    /// The height axis is elided when only the ground plane changed.
    fn add_base_pos_to_bundle(&mut self, bundle: &mut Bundle, base_pos: Vec3) {

        let movement = base_pos - self.last_base_pos;
        if movement.length() < BASE_POS_MIN_MOVEMENT {
            return;
        }

        let previous = self.last_base_pos;
        self.last_base_pos = base_pos;

        if (base_pos.y - previous.y).abs() > BASE_POS_MIN_MOVEMENT {
            bundle.add_element(&client::UpdateBasePos { position: base_pos });
        } else {
            bundle.add_element(&client::UpdateBasePosXz { x: base_pos.x, z: base_pos.z });
        }

    }

    /// Emit the leave message for the given id, in its optimized aliased form
    /// whenever the current membership allows it. Returns the appended size.
    fn add_smart_leave_message(&self, bundle: &mut Bundle, entity_id: EntityId) -> usize {
        if self.aliases_usable() {
            let alias = self.membership.alias_of(entity_id);
            bundle.add_element(&client::EntityLeaveWorldOptimized { entity_id: WireEntityId::Alias(alias) })
        } else {
            bundle.add_element(&client::EntityLeaveWorld { entity_id })
        }
    }

    /// Write an entity identity into a volatile update stream, as its 8-bit
    /// alias whenever the current membership allows it.
    fn write_entity_id(&self, stream: &mut Vec<u8>, entity_id: EntityId) -> std::io::Result<()> {
        if self.aliases_usable() {
            stream.write_u8(self.membership.alias_of(entity_id))
        } else {
            stream.write_u32(entity_id)
        }
    }

    fn aliases_usable(&self) -> bool {
        self.config.entity_alias_id && self.membership.len() <= 255
    }

}


#[cfg(test)]
mod tests {

    use std::io;

    use crate::net::bundle::BundleElementReader;
    use crate::net::channel::ChannelSink;
    use crate::net::client::{element_length, id};
    use crate::cell::entity::{ClientMailbox, Entity};

    use super::*;

    const VIEWER_ID: EntityId = 1;

    struct RecordingSink(Rc<RefCell<Vec<Vec<u8>>>>);

    impl ChannelSink for RecordingSink {
        fn deliver(&mut self, bundle: &Bundle) -> io::Result<()> {
            self.0.borrow_mut().push(bundle.data().to_vec());
            Ok(())
        }
    }

    struct Harness {
        registry: EntityRegistry,
        scheduler: Scheduler,
        witness: Witness,
        delivered: Rc<RefCell<Vec<Vec<u8>>>>,
    }

    fn harness() -> Harness {
        harness_with(CellConfig::default())
    }

    fn harness_with(config: CellConfig) -> Harness {

        let delivered = Rc::new(RefCell::new(Vec::new()));
        let channel = Rc::new(RefCell::new(Channel::new(Box::new(RecordingSink(Rc::clone(&delivered))))));

        let mut registry = EntityRegistry::new();
        let mut viewer = Entity::new(VIEWER_ID, 1);
        viewer.set_client_mailbox(Some(ClientMailbox::new(channel)));
        registry.insert(viewer);

        let mut scheduler = Scheduler::new();
        let mut witness = Witness::new(Rc::new(config));
        witness.attach(&mut scheduler, VIEWER_ID).unwrap();

        Harness { registry, scheduler, witness, delivered }

    }

    impl Harness {

        fn spawn(&mut self, id: EntityId) {
            self.registry.insert(Entity::new(id, 7));
        }

        fn enter(&mut self, id: EntityId) {
            self.witness.on_enter_aoi(&mut self.registry, id);
        }

        fn leave(&mut self, id: EntityId) {
            self.witness.on_leave_aoi(&mut self.registry, id);
        }

        fn update(&mut self, now: GameTime) {
            assert!(self.witness.update(&mut self.registry, now));
        }

        fn frame_count(&self) -> usize {
            self.delivered.borrow().len()
        }

        /// Decode one delivered frame into (id, payload) pairs.
        fn frame(&self, index: usize) -> Vec<(u8, Vec<u8>)> {
            let delivered = self.delivered.borrow();
            let mut reader = BundleElementReader::new(&delivered[index], element_length);
            let mut elements = Vec::new();
            while let Some(elt) = reader.next_element() {
                let elt = elt.unwrap();
                elements.push((elt.id, elt.data.to_vec()));
            }
            elements
        }

        fn last_frame(&self) -> Vec<(u8, Vec<u8>)> {
            self.frame(self.frame_count() - 1)
        }

        fn frame_ids(&self, index: usize) -> Vec<u8> {
            self.frame(index).into_iter().map(|(id, _)| id).collect()
        }

        fn any_pending(&self, pending: u8) -> bool {
            self.witness.membership().iter().any(|r| r.has_flags(pending))
        }

    }

    #[test]
    fn first_update_emits_full_base_pos() {

        let mut h = harness();
        h.update(0);

        assert_eq!(h.frame_count(), 1);
        let frame = h.frame(0);
        assert_eq!(frame.len(), 2);

        // Viewer is always alias 0 in the frame prefix.
        assert_eq!(frame[0].0, id::SELECT_ALIASED_ENTITY);
        assert_eq!(frame[0].1, [0]);

        // The −∞ sentinel forces the full XYZ form on the first tick.
        assert_eq!(frame[1].0, id::UPDATE_BASE_POS);
        assert_eq!(frame[1].1, [0; 12]);

    }

    #[test]
    fn base_pos_forms_and_suppression() {

        let mut h = harness();
        h.update(0);

        // Ground-plane movement elides the height axis.
        h.registry.get_mut(VIEWER_ID).unwrap().set_position(Vec3::new(5.0, 0.0, 5.0), 1);
        h.update(1);
        assert_eq!(h.frame_ids(1), [id::SELECT_ALIASED_ENTITY, id::UPDATE_BASE_POS_XZ]);

        // A height change brings the full form back.
        h.registry.get_mut(VIEWER_ID).unwrap().set_position(Vec3::new(5.0, 3.0, 5.0), 2);
        h.update(2);
        let frame = h.frame(2);
        assert_eq!(frame[1].0, id::UPDATE_BASE_POS);
        assert_eq!(frame[1].1[4..8], 3.0f32.to_le_bytes());

        // Sub-threshold movement is suppressed entirely.
        h.registry.get_mut(VIEWER_ID).unwrap().set_position(Vec3::new(5.0, 3.0, 5.0001), 3);
        h.update(3);
        assert_eq!(h.frame_ids(3), [id::SELECT_ALIASED_ENTITY]);

    }

    #[test]
    fn enter_aoi_sends_properties_then_enter_world() {

        let mut h = harness();
        h.spawn(42);
        h.enter(42);

        assert!(h.witness.membership()[0].has_flags(flags::ENTER_CLIENT_PENDING));
        assert_eq!(h.registry.get(42).unwrap().witnessed_by(), [VIEWER_ID]);

        h.update(0);

        assert_eq!(h.frame_ids(0), [
            id::SELECT_ALIASED_ENTITY,
            id::UPDATE_BASE_POS,
            id::UPDATE_PROPERTYS,
            id::ENTITY_ENTER_WORLD,
        ]);

        let frame = h.frame(0);
        // Property frame: full id, then 24 bytes of position and direction.
        assert_eq!(frame[2].1.len(), 28);
        assert_eq!(frame[2].1[..4], 42u32.to_le_bytes());
        // Enter world: full id and entity type.
        assert_eq!(frame[3].1[..4], 42u32.to_le_bytes());
        assert_eq!(frame[3].1[4..], 7u16.to_le_bytes());

        let entity_ref = &h.witness.membership()[0];
        assert_eq!(entity_ref.flags(), 0);
        assert_eq!(entity_ref.handle(), Some(42));

    }

    #[test]
    fn leave_aoi_sends_optimized_leave() {

        let mut h = harness();
        h.spawn(42);
        h.enter(42);
        h.update(0);

        h.leave(42);
        assert!(h.witness.membership()[0].has_flags(flags::LEAVE_CLIENT_PENDING));
        assert!(h.witness.membership()[0].handle().is_none());
        assert!(h.registry.get(42).unwrap().witnessed_by().is_empty());

        h.update(1);

        // Viewer did not move, so the base position is suppressed and the
        // leave references alias 0.
        let frame = h.last_frame();
        assert_eq!(frame[0].0, id::SELECT_ALIASED_ENTITY);
        assert_eq!(frame[1].0, id::ENTITY_LEAVE_WORLD_OPTIMIZED);
        assert_eq!(frame[1].1, [0]);
        assert!(h.witness.membership().is_empty());

    }

    #[test]
    fn duplicate_enter_is_idempotent() {

        let mut h = harness();
        h.spawn(42);
        h.enter(42);
        h.enter(42);

        assert_eq!(h.witness.membership().len(), 1);
        assert_eq!(h.witness.membership()[0].flags(), flags::ENTER_CLIENT_PENDING);

        h.update(0);
        h.enter(42);

        assert_eq!(h.witness.membership()[0].flags(), 0);
        assert_eq!(h.registry.get(42).unwrap().witnessed_by(), [VIEWER_ID]);

        // The duplicate produces no extra enter sequence, only the steady
        // volatile update remains.
        h.update(1);
        assert_eq!(h.frame_ids(1), [id::SELECT_ALIASED_ENTITY, id::UPDATE_DATA_XYZ_YPR]);

    }

    #[test]
    fn enter_then_leave_before_update_is_silent() {

        let mut h = harness();
        h.spawn(42);
        h.enter(42);
        h.leave(42);

        // The record lingers flagless until its scheduled drop.
        assert_eq!(h.witness.membership().len(), 1);
        assert_eq!(h.witness.membership()[0].flags(), 0);
        assert!(h.witness.membership()[0].handle().is_none());
        assert!(h.registry.get(42).unwrap().witnessed_by().is_empty());

        h.update(0);

        assert_eq!(h.frame_ids(0), [id::SELECT_ALIASED_ENTITY, id::UPDATE_BASE_POS]);
        assert!(h.witness.membership().is_empty());

    }

    #[test]
    fn leave_then_reenter_restores_handle() {

        let mut h = harness();
        h.spawn(42);
        h.enter(42);
        h.update(0);

        h.leave(42);
        h.enter(42);

        let entity_ref = &h.witness.membership()[0];
        assert_eq!(entity_ref.flags(), 0);
        assert_eq!(entity_ref.handle(), Some(42));
        assert_eq!(h.registry.get(42).unwrap().witnessed_by(), [VIEWER_ID]);

        // No enter or leave message, straight back to steady state.
        h.update(1);
        assert_eq!(h.frame_ids(1), [id::SELECT_ALIASED_ENTITY, id::UPDATE_DATA_XYZ_YPR]);

    }

    #[test]
    fn enter_leave_reenter_before_update_enters_once() {

        let mut h = harness();
        h.spawn(42);
        h.enter(42);
        h.leave(42);
        h.enter(42);

        assert_eq!(h.witness.membership().len(), 1);
        assert_eq!(h.witness.membership()[0].flags(), flags::ENTER_CLIENT_PENDING);
        assert_eq!(h.witness.membership()[0].handle(), Some(42));

        h.update(0);
        let ids = h.frame_ids(0);
        assert_eq!(ids.iter().filter(|&&i| i == id::ENTITY_ENTER_WORLD).count(), 1);

    }

    #[test]
    fn destroyed_enter_pending_target_degrades_to_silent_leave() {

        let mut h = harness();
        h.spawn(42);
        h.enter(42);
        h.registry.remove(42);

        h.update(0);

        assert_eq!(h.frame_ids(0), [id::SELECT_ALIASED_ENTITY, id::UPDATE_BASE_POS]);
        assert!(h.witness.membership().is_empty());

    }

    #[test]
    fn destroyed_steady_target_is_dropped_silently() {

        let mut h = harness();
        h.spawn(42);
        h.enter(42);
        h.update(0);

        h.registry.remove(42);
        h.update(1);

        assert_eq!(h.frame_ids(1), [id::SELECT_ALIASED_ENTITY]);
        assert!(h.witness.membership().is_empty());

    }

    #[test]
    fn budget_spills_pending_enters_to_later_ticks() {

        let mut h = harness();

        // Pad the property blob so one enter sequence costs 238 bytes and
        // only a handful fit under the packet budget.
        let count = 30;
        for i in 0..count {
            let entity_id = 100 + i;
            h.spawn(entity_id);
            h.registry.get_mut(entity_id).unwrap().set_client_data(vec![0; 200]);
            h.enter(entity_id);
        }

        let mut now = 0;
        let mut enters = 0;
        while h.any_pending(flags::ENTER_CLIENT_PENDING) {

            assert!(now < 20, "pending enters must drain");
            let before = h.frame_count();
            h.update(now);
            now += 1;

            // The overrun is bounded by the one element straddling the cap,
            // plus the frame prefix and base position.
            let frame_size = h.delivered.borrow()[before].len();
            assert!(frame_size <= PACKET_MAX_SIZE_TCP + 238 + 32);

            // Progress: every tick with remaining budget drains something.
            let new_enters = h.frame(before).iter()
                .filter(|&&(elt_id, _)| elt_id == id::ENTITY_ENTER_WORLD)
                .count();
            assert!(new_enters >= 1);
            enters += new_enters;

        }

        assert!(now > 1, "the batch must not fit in a single tick");
        assert_eq!(enters, count as usize);

    }

    #[test]
    fn membership_over_255_disables_aliases() {

        use crate::cell::entity::VolatileInfo;

        // Volatile fields are muted so every steady update is a bare
        // identity, the shortest element the walk can emit.
        let mut h = harness();
        let count = 256u32;
        for i in 0..count {
            let entity_id = 1000 + i;
            h.spawn(entity_id);
            h.registry.get_mut(entity_id).unwrap().set_volatile_info(VolatileInfo::NEVER);
            h.enter(entity_id);
        }

        // The frame prefix switches to the full-id form as soon as the
        // membership exceeds 255.
        let mut now = 0;
        h.update(now);
        assert_eq!(h.frame(0)[0].0, id::SELECT_ENTITY);
        assert_eq!(h.frame(0)[0].1, VIEWER_ID.to_le_bytes());

        // Steady updates transmit the full 32-bit id, not an alias.
        now += 1;
        let before = h.frame_count();
        h.update(now);
        let updates = h.frame(before).iter()
            .filter(|&&(elt_id, _)| elt_id == id::UPDATE_DATA)
            .map(|(_, data)| data.len())
            .collect::<Vec<_>>();
        assert!(!updates.is_empty());
        assert!(updates.iter().all(|&len| len == 4));

        // Shrink the membership back under the boundary: the front records
        // are all transmitted by now, their leaves drain in one tick.
        for i in 0..60 {
            h.leave(1000 + i);
        }
        now += 1;
        h.update(now);
        assert!(!h.any_pending(flags::LEAVE_CLIENT_PENDING));
        assert_eq!(h.witness.membership().len(), 196);

        // Drain the enters still pending from the oversized phase.
        while h.any_pending(flags::ENTER_CLIENT_PENDING) {
            assert!(now < 100);
            now += 1;
            h.update(now);
        }

        // Aliases resume on the following frame, re-derived from the new
        // insertion order.
        now += 1;
        let before = h.frame_count();
        h.update(now);
        let frame = h.frame(before);
        assert_eq!(frame[0].0, id::SELECT_ALIASED_ENTITY);
        let updates = frame.iter()
            .filter(|&&(elt_id, _)| elt_id == id::UPDATE_DATA)
            .map(|(_, data)| data.clone())
            .collect::<Vec<_>>();
        assert_eq!(updates.len(), 196);
        assert!(updates.iter().all(|data| data.len() == 1));
        assert_eq!(updates[0], [0]);

    }

    #[test]
    fn exhausted_budget_skips_emission_but_still_flushes() {

        let mut h = harness();

        // Fill the channel beyond the per-tick budget before the update.
        let channel = h.witness.channel(&h.registry).unwrap();
        let mut filler = Bundle::new();
        filler.add_element_raw(id::UPDATE_PROPERTYS, ElementLength::Variable16, &vec![0; PACKET_MAX_SIZE_TCP]);
        channel.borrow_mut().push_bundle(filler);

        h.update(0);

        // Only the pre-queued filler went out, no frame was encoded.
        assert_eq!(h.frame_count(), 1);
        assert!(h.delivered.borrow()[0].len() > PACKET_MAX_SIZE_TCP);

        // The next tick emits normally.
        h.update(1);
        assert_eq!(h.frame_count(), 2);
        assert_eq!(h.frame_ids(1), [id::SELECT_ALIASED_ENTITY, id::UPDATE_BASE_POS]);

    }

    #[test]
    fn update_without_viewer_or_channel_is_noop() {

        let mut h = harness();
        h.registry.get_mut(VIEWER_ID).unwrap().set_client_mailbox(None);
        h.update(0);
        assert_eq!(h.frame_count(), 0);

        h.registry.remove(VIEWER_ID);
        h.update(1);
        assert_eq!(h.frame_count(), 0);

    }

    #[test]
    fn attach_twice_fails() {
        let mut h = harness();
        assert!(matches!(
            h.witness.attach(&mut h.scheduler, 2),
            Err(WitnessError::AlreadyAttached(VIEWER_ID)),
        ));
    }

    #[test]
    fn detach_tears_everything_down() {

        let mut h = harness();
        h.spawn(42);
        h.enter(42);
        h.update(0);
        assert!(h.scheduler.contains(VIEWER_ID));

        h.witness.detach(&mut h.registry, &mut h.scheduler, VIEWER_ID);

        assert!(h.witness.viewer().is_none());
        assert!(h.witness.membership().is_empty());
        assert!(h.witness.trigger().is_none());
        assert!(!h.scheduler.contains(VIEWER_ID));
        assert!(h.registry.get(42).unwrap().witnessed_by().is_empty());

    }

    #[test]
    #[should_panic(expected = "non-matching viewer")]
    fn detach_with_wrong_viewer_panics() {
        let mut h = harness();
        h.witness.detach(&mut h.registry, &mut h.scheduler, 2);
    }

    #[test]
    fn aoi_radius_clamped_under_ghost_distance() {

        let mut h = harness_with(CellConfig {
            ghost_distance: 100.0,
            ..CellConfig::default()
        });

        h.witness.set_aoi_radius(200.0, 10.0);
        assert_eq!(h.witness.aoi_radius(), 95.0);
        assert_eq!(h.witness.aoi_hysteresis(), 5.0);
        assert_eq!(h.witness.trigger().unwrap().range(), (95.0, 95.0));

    }

    #[test]
    fn disabled_coordinate_system_ignores_radius() {
        let mut h = harness_with(CellConfig {
            use_coordinate_system: false,
            ..CellConfig::default()
        });
        assert!(h.witness.trigger().is_none());
        h.witness.set_aoi_radius(50.0, 5.0);
        assert_eq!(h.witness.aoi_radius(), 0.0);
        assert!(h.witness.trigger().is_none());
    }

    #[test]
    fn space_transitions_frame_the_viewer() {

        let mut h = harness();
        h.witness.on_enter_space(&h.registry);

        assert!(h.witness.trigger().unwrap().is_installed());
        let frame = h.frame(0);
        assert_eq!(frame[0].0, id::UPDATE_PROPERTYS);
        assert_eq!(frame[0].1[..4], VIEWER_ID.to_le_bytes());
        assert_eq!(frame[1].0, id::ENTITY_ENTER_WORLD);

        h.witness.on_leave_space(&h.registry);
        assert!(!h.witness.trigger().unwrap().is_installed());
        let frame = h.last_frame();
        assert_eq!(frame[0].0, id::ENTITY_LEAVE_WORLD);
        assert_eq!(frame[0].1, VIEWER_ID.to_le_bytes());

    }

    #[test]
    fn send_to_client_requires_a_channel() {

        let mut h = harness();

        let mut bundle = Bundle::new();
        bundle.add_element(&client::EntityLeaveWorld { entity_id: 9 });
        assert!(h.witness.send_to_client(&h.registry, bundle));
        assert_eq!(h.witness.channel(&h.registry).unwrap().borrow().bundles_count(), 1);

        h.registry.get_mut(VIEWER_ID).unwrap().set_client_mailbox(None);
        let mut bundle = Bundle::new();
        bundle.add_element(&client::EntityLeaveWorld { entity_id: 9 });
        assert!(!h.witness.send_to_client(&h.registry, bundle));

    }

}
