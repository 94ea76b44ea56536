//! Rigid-body world of one bike + rider, on Rapier2D
//!
//! Rapier owns the bodies, the rider's revolute joints and the integration.
//! Level geometry is not a Rapier collider: contacts come from a
//! `CollisionSurface` each tick and are resolved here, against static
//! geometry, before the pipeline steps.
//!
//! Bodies carry explicit mass properties and no colliders. Forces
//! accumulate per body and are handed to Rapier right before the step.
//! Bodies never auto-sleep; `set_enabled(false)` puts one to sleep and
//! pins it in place until it is enabled again.

use std::f32::consts::PI;
use std::fmt;

use glam::{Mat2, Vec2};
use rapier2d::prelude::*;

use super::collision::Contact;

/// Handle to a body in a `World`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BodyId(usize);

/// Handle to a hinge joint in a `World`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JointId(usize);

/// Shape used to derive a body's moment of inertia
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MassShape {
    Sphere { radius: f32 },
    Box { lx: f32, ly: f32 },
}

impl MassShape {
    /// Moment of inertia about the z axis for total mass `mass`
    pub fn inertia(&self, mass: f32) -> f32 {
        match *self {
            MassShape::Sphere { radius } => 0.4 * mass * radius * radius,
            MassShape::Box { lx, ly } => mass / 12.0 * (lx * lx + ly * ly),
        }
    }
}

/// Angle stop of a hinge. `lo >= hi` locks the hinge at `lo` with a spring
/// of the given erp/cfm; an open range is a hard limit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HingeLimits {
    pub lo: f32,
    pub hi: f32,
    pub erp: f32,
    pub cfm: f32,
}

impl HingeLimits {
    pub fn locked(at: f32, erp: f32, cfm: f32) -> Self {
        Self { lo: at, hi: at, erp, cfm }
    }

    pub fn is_locked(&self) -> bool {
        self.lo >= self.hi
    }
}

/// Spring stiffness and damping equivalent to an erp/cfm pair at step `dt`
pub fn spring_from_erp_cfm(erp: f32, cfm: f32, dt: f32) -> (f32, f32) {
    if cfm <= 0.0 || dt <= 0.0 {
        return (0.0, 0.0);
    }
    (erp / (dt * cfm), (1.0 - erp) / cfm)
}

#[derive(Debug, Clone, Copy)]
struct BodySlot {
    handle: RigidBodyHandle,
    inv_mass: f32,
    inv_inertia: f32,
    force: Vec2,
    torque: f32,
    enabled: bool,
}

#[derive(Debug, Clone, Copy)]
struct Hinge {
    handle: ImpulseJointHandle,
    a: BodyId,
    b: BodyId,
    local_b: Vec2,
    reference_angle: f32,
    limits: HingeLimits,
}

#[derive(Debug, Clone, Copy)]
struct ContactJoint {
    body: BodyId,
    contact: Contact,
    mu: f32,
    erp: f32,
    cfm: f32,
    normal_impulse: f32,
    tangent_impulse: f32,
}

fn to_vector(v: Vec2) -> Vector<Real> {
    vector![v.x, v.y]
}

fn to_vec2(v: &Vector<Real>) -> Vec2 {
    Vec2::new(v.x, v.y)
}

/// Rapier sets plus the bookkeeping the bike tick needs
pub struct World {
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    island_manager: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    ccd_solver: CCDSolver,
    pipeline: PhysicsPipeline,
    params: IntegrationParameters,
    slots: Vec<BodySlot>,
    hinges: Vec<Hinge>,
    contacts: Vec<ContactJoint>,
    pub gravity: Vec2,
    iterations: u32,
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("bodies", &self.slots.len())
            .field("hinges", &self.hinges.len())
            .field("contacts", &self.contacts.len())
            .field("gravity", &self.gravity)
            .field("dt", &self.params.dt)
            .finish_non_exhaustive()
    }
}

impl World {
    /// Empty world stepping at `dt` seconds with `iterations` solver passes
    pub fn new(gravity: Vec2, dt: f32, iterations: u32) -> Self {
        let mut params = IntegrationParameters {
            dt,
            ..Default::default()
        };
        let wanted = iterations.max(1) as usize;
        params.num_solver_iterations = wanted.try_into().unwrap_or(params.num_solver_iterations);

        Self {
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            ccd_solver: CCDSolver::new(),
            pipeline: PhysicsPipeline::new(),
            params,
            slots: Vec::new(),
            hinges: Vec::new(),
            contacts: Vec::new(),
            gravity,
            iterations: iterations.max(1),
        }
    }

    /// Dynamic body at `position`, unrotated and at rest
    pub fn add_body(&mut self, position: Vec2, mass: f32, shape: MassShape) -> BodyId {
        let inertia = shape.inertia(mass);
        let body = RigidBodyBuilder::dynamic()
            .translation(to_vector(position))
            .additional_mass_properties(MassProperties::new(point![0.0, 0.0], mass, inertia))
            .can_sleep(false)
            .build();
        let handle = self.bodies.insert(body);
        self.slots.push(BodySlot {
            handle,
            inv_mass: if mass > 0.0 { 1.0 / mass } else { 0.0 },
            inv_inertia: if inertia > 0.0 { 1.0 / inertia } else { 0.0 },
            force: Vec2::ZERO,
            torque: 0.0,
            enabled: true,
        });
        BodyId(self.slots.len() - 1)
    }

    pub fn num_bodies(&self) -> usize {
        self.slots.len()
    }

    fn rb(&self, id: BodyId) -> &RigidBody {
        &self.bodies[self.slots[id.0].handle]
    }

    fn rb_mut(&mut self, id: BodyId) -> &mut RigidBody {
        &mut self.bodies[self.slots[id.0].handle]
    }

    pub fn position(&self, id: BodyId) -> Vec2 {
        to_vec2(self.rb(id).translation())
    }

    pub fn angle(&self, id: BodyId) -> f32 {
        self.rb(id).rotation().angle()
    }

    pub fn rotation(&self, id: BodyId) -> Mat2 {
        Mat2::from_angle(self.angle(id))
    }

    pub fn linvel(&self, id: BodyId) -> Vec2 {
        to_vec2(self.rb(id).linvel())
    }

    pub fn angvel(&self, id: BodyId) -> f32 {
        self.rb(id).angvel()
    }

    pub fn set_velocity(&mut self, id: BodyId, linvel: Vec2, angvel: f32) {
        let body = self.rb_mut(id);
        body.set_linvel(to_vector(linvel), false);
        body.set_angvel(angvel, false);
    }

    /// Local point of body `id` to world space
    pub fn world_point(&self, id: BodyId, local: Vec2) -> Vec2 {
        self.rotation(id) * local + self.position(id)
    }

    /// World point to the local space of body `id`
    pub fn local_point(&self, id: BodyId, world: Vec2) -> Vec2 {
        self.rotation(id).transpose() * (world - self.position(id))
    }

    pub fn add_force(&mut self, id: BodyId, force: Vec2) {
        self.slots[id.0].force += force;
    }

    /// Force applied at a world point, adding the matching torque
    pub fn add_force_at_pos(&mut self, id: BodyId, force: Vec2, point: Vec2) {
        let arm = point - self.position(id);
        let slot = &mut self.slots[id.0];
        slot.force += force;
        slot.torque += arm.perp_dot(force);
    }

    pub fn add_torque(&mut self, id: BodyId, torque: f32) {
        self.slots[id.0].torque += torque;
    }

    /// Wake the body up, or put it to sleep. A disabled body keeps its
    /// pose through `step` even if a joint wakes it inside Rapier.
    pub fn set_enabled(&mut self, id: BodyId, enabled: bool) {
        self.slots[id.0].enabled = enabled;
        let body = self.rb_mut(id);
        if enabled {
            if body.is_sleeping() {
                body.wake_up(true);
            }
        } else if !body.is_sleeping() {
            body.sleep();
        }
    }

    pub fn is_enabled(&self, id: BodyId) -> bool {
        self.slots[id.0].enabled
    }

    /// Revolute joint between `a` and `b` around the world point `anchor`,
    /// locked at the current relative angle with the given stop erp/cfm
    pub fn add_hinge(&mut self, a: BodyId, b: BodyId, anchor: Vec2, stop_erp: f32, stop_cfm: f32) -> JointId {
        let local_a = self.local_point(a, anchor);
        let local_b = self.local_point(b, anchor);
        // Rapier measures the angle of body2 relative to body1, so b goes first
        let joint = RevoluteJointBuilder::new()
            .local_anchor1(point![local_b.x, local_b.y])
            .local_anchor2(point![local_a.x, local_a.y])
            .motor_model(MotorModel::ForceBased)
            .contacts_enabled(false)
            .build();
        let handle = self
            .impulse_joints
            .insert(self.slots[b.0].handle, self.slots[a.0].handle, joint, true);
        self.hinges.push(Hinge {
            handle,
            a,
            b,
            local_b,
            reference_angle: self.angle(a) - self.angle(b),
            limits: HingeLimits::locked(0.0, stop_erp, stop_cfm),
        });
        let id = JointId(self.hinges.len() - 1);
        self.apply_hinge_limits(id);
        id
    }

    pub fn set_hinge_limits(&mut self, id: JointId, limits: HingeLimits) {
        self.hinges[id.0].limits = limits;
        self.apply_hinge_limits(id);
    }

    pub fn hinge_limits(&self, id: JointId) -> HingeLimits {
        self.hinges[id.0].limits
    }

    fn apply_hinge_limits(&mut self, id: JointId) {
        let h = self.hinges[id.0];
        let (lim, offset) = (h.limits, h.reference_angle);
        let (stiffness, damping) = spring_from_erp_cfm(lim.erp, lim.cfm, self.params.dt);
        let Some(joint) = self.impulse_joints.get_mut(h.handle, true) else {
            return;
        };
        if lim.is_locked() {
            joint.data.set_limits(JointAxis::AngX, [-PI, PI]);
            joint
                .data
                .set_motor_position(JointAxis::AngX, lim.lo + offset, stiffness, damping);
        } else {
            joint.data.set_limits(JointAxis::AngX, [lim.lo + offset, lim.hi + offset]);
            joint.data.set_motor_position(JointAxis::AngX, 0.0, 0.0, 0.0);
        }
    }

    /// Rotation of body a relative to body b, minus the angle at creation
    pub fn hinge_angle(&self, id: JointId) -> f32 {
        let h = &self.hinges[id.0];
        self.angle(h.a) - self.angle(h.b) - h.reference_angle
    }

    /// World position of the hinge as seen from body b
    pub fn hinge_anchor(&self, id: JointId) -> Vec2 {
        let h = &self.hinges[id.0];
        self.world_point(h.b, h.local_b)
    }

    /// Contact against static geometry, valid until `clear_contacts`
    pub fn add_contact(&mut self, body: BodyId, contact: Contact, mu: f32, erp: f32, cfm: f32) {
        self.contacts.push(ContactJoint {
            body,
            contact,
            mu,
            erp,
            cfm,
            normal_impulse: 0.0,
            tangent_impulse: 0.0,
        });
    }

    pub fn num_contacts(&self) -> usize {
        self.contacts.len()
    }

    pub fn clear_contacts(&mut self) {
        self.contacts.clear();
    }

    /// Advance the world by `dt` seconds
    pub fn step(&mut self, dt: f32) {
        if dt <= 0.0 {
            return;
        }
        self.params.dt = dt;
        self.solve_contacts(dt);

        let mut pinned = Vec::new();
        for slot in self.slots.iter_mut() {
            let body = &mut self.bodies[slot.handle];
            if slot.enabled {
                body.add_force(to_vector(slot.force), false);
                body.add_torque(slot.torque, false);
            } else {
                pinned.push((slot.handle, *body.position()));
            }
        }

        self.pipeline.step(
            &to_vector(self.gravity),
            &self.params,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            &(),
            &(),
        );

        for (handle, pose) in pinned {
            let body = &mut self.bodies[handle];
            body.set_position(pose, false);
            body.set_linvel(vector![0.0, 0.0], false);
            body.set_angvel(0.0, false);
            body.sleep();
        }

        for slot in self.slots.iter_mut() {
            let body = &mut self.bodies[slot.handle];
            body.reset_forces(false);
            body.reset_torques(false);
            slot.force = Vec2::ZERO;
            slot.torque = 0.0;
        }
    }

    /// Sequential impulses on the contacts, against the velocities the
    /// bodies will have once gravity and this step's forces are applied.
    /// The result goes back into Rapier as a velocity change.
    fn solve_contacts(&mut self, dt: f32) {
        if self.contacts.is_empty() {
            return;
        }
        let gravity = self.gravity;
        let mut predicted: Vec<Option<(Vec2, f32)>> = self
            .slots
            .iter()
            .map(|slot| {
                let body = &self.bodies[slot.handle];
                (slot.enabled && slot.inv_mass > 0.0).then(|| {
                    (
                        to_vec2(body.linvel()) + (gravity + slot.force * slot.inv_mass) * dt,
                        body.angvel() + slot.torque * slot.inv_inertia * dt,
                    )
                })
            })
            .collect();
        let mut delta = vec![(Vec2::ZERO, 0.0f32); self.slots.len()];

        for _ in 0..self.iterations {
            for c in self.contacts.iter_mut() {
                let i = c.body.0;
                let Some((vel, ang_vel)) = predicted[i].as_mut() else {
                    continue;
                };
                let slot = &self.slots[i];
                let center = to_vec2(self.bodies[slot.handle].translation());
                let (m, inv_i) = (slot.inv_mass, slot.inv_inertia);
                let n = c.contact.normal;
                let r = c.contact.point - center;
                let gamma = c.cfm / dt;

                // Normal
                let vn = (*vel + r.perp() * *ang_vel).dot(n);
                let rn = r.perp_dot(n);
                let kn = m + inv_i * rn * rn + gamma;
                let bias = c.contact.depth * (c.erp / dt);
                let lambda = (-vn + bias - c.normal_impulse * gamma) / kn;
                let total = (c.normal_impulse + lambda).max(0.0);
                let dn = total - c.normal_impulse;
                c.normal_impulse = total;
                let impulse = n * dn;
                *vel += impulse * m;
                *ang_vel += inv_i * r.perp_dot(impulse);
                delta[i].0 += impulse * m;
                delta[i].1 += inv_i * r.perp_dot(impulse);

                // Friction
                let t = n.perp();
                let vt = (*vel + r.perp() * *ang_vel).dot(t);
                let rt = r.perp_dot(t);
                let kt = m + inv_i * rt * rt;
                if kt <= 0.0 {
                    continue;
                }
                let max_friction = c.mu * total;
                let total_t = (c.tangent_impulse - vt / kt).clamp(-max_friction, max_friction);
                let impulse = t * (total_t - c.tangent_impulse);
                c.tangent_impulse = total_t;
                *vel += impulse * m;
                *ang_vel += inv_i * r.perp_dot(impulse);
                delta[i].0 += impulse * m;
                delta[i].1 += inv_i * r.perp_dot(impulse);
            }
        }

        for (slot, (dv, dw)) in self.slots.iter().zip(delta) {
            if dv == Vec2::ZERO && dw == 0.0 {
                continue;
            }
            let body = &mut self.bodies[slot.handle];
            let linvel = to_vec2(body.linvel()) + dv;
            let angvel = body.angvel() + dw;
            body.set_linvel(to_vector(linvel), false);
            body.set_angvel(angvel, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 0.006;

    fn world() -> World {
        World::new(Vec2::new(0.0, -9.81), DT, 10)
    }

    fn ball(w: &mut World, pos: Vec2, mass: f32, radius: f32) -> BodyId {
        w.add_body(pos, mass, MassShape::Sphere { radius })
    }

    #[test]
    fn test_inertia() {
        assert!((MassShape::Sphere { radius: 0.35 }.inertia(10.0) - 0.49).abs() < 1e-5);
        assert!((MassShape::Box { lx: 1.2, ly: 1.8 }.inertia(90.0) - 35.1).abs() < 1e-3);
    }

    #[test]
    fn test_spring_from_erp_cfm() {
        let (k, d) = spring_from_erp_cfm(0.3, 1e-4, 0.006);
        assert!((k - 5.0e5).abs() < 1.0);
        assert!((d - 7000.0).abs() < 1e-2);
        assert_eq!(spring_from_erp_cfm(0.3, 0.0, 0.006), (0.0, 0.0));
    }

    #[test]
    fn test_free_fall() {
        let mut w = world();
        let id = ball(&mut w, Vec2::ZERO, 1.0, 0.1);
        for _ in 0..100 {
            w.step(DT);
        }
        assert!((w.linvel(id).y + 9.81 * DT * 100.0).abs() < 1e-2);
        assert!(w.position(id).y < 0.0);
    }

    #[test]
    fn test_sleeping_body_ignores_forces() {
        let mut w = world();
        w.gravity = Vec2::ZERO;
        let id = ball(&mut w, Vec2::ONE, 1.0, 0.1);
        w.set_enabled(id, false);
        assert!(!w.is_enabled(id));
        w.add_force(id, Vec2::new(100.0, 0.0));
        w.step(DT);
        assert_eq!(w.position(id), Vec2::ONE);
        assert_eq!(w.linvel(id), Vec2::ZERO);

        w.set_enabled(id, true);
        w.add_force(id, Vec2::new(100.0, 0.0));
        w.step(DT);
        assert!(w.is_enabled(id));
        assert!(w.linvel(id).x > 0.0);
    }

    #[test]
    fn test_disabled_body_stays_put_under_a_jointed_body() {
        let mut w = world();
        let anchor = ball(&mut w, Vec2::ZERO, 5.0, 0.4);
        let arm = ball(&mut w, Vec2::new(1.0, 0.0), 1.0, 0.2);
        w.add_hinge(arm, anchor, Vec2::new(0.5, 0.0), 0.3, 1e-4);
        w.set_enabled(anchor, false);
        for _ in 0..50 {
            w.add_force(arm, Vec2::new(0.0, -30.0));
            w.step(DT);
        }
        assert!(!w.is_enabled(anchor));
        assert_eq!(w.position(anchor), Vec2::ZERO);
        assert_eq!(w.angle(anchor), 0.0);
        assert!(w.is_enabled(arm));
    }

    #[test]
    fn test_forces_do_not_carry_over() {
        let mut w = world();
        w.gravity = Vec2::ZERO;
        let id = ball(&mut w, Vec2::ZERO, 1.0, 0.1);
        w.add_force(id, Vec2::new(10.0, 0.0));
        w.step(DT);
        let v = w.linvel(id).x;
        w.step(DT);
        assert!((w.linvel(id).x - v).abs() < 1e-6);
    }

    #[test]
    fn test_force_at_point_adds_torque() {
        let mut w = world();
        w.gravity = Vec2::ZERO;
        let id = ball(&mut w, Vec2::ZERO, 1.0, 1.0);
        w.add_force_at_pos(id, Vec2::new(0.0, 10.0), Vec2::new(1.0, 0.0));
        w.step(DT);
        assert!(w.angvel(id) > 0.0);
    }

    #[test]
    fn test_contact_stops_fall() {
        let mut w = world();
        let id = ball(&mut w, Vec2::new(0.0, 0.3), 10.0, 0.35);
        for _ in 0..200 {
            let pos = w.position(id);
            let depth = 0.35 - pos.y;
            if depth > 0.0 {
                let contact = Contact {
                    point: Vec2::new(pos.x, 0.0),
                    normal: Vec2::Y,
                    depth,
                };
                w.add_contact(id, contact, 20.0, 0.8, 1e-5);
            }
            w.step(DT);
            w.clear_contacts();
        }
        let y = w.position(id).y;
        assert!(y > 0.3 && y < 0.4, "y = {y}");
        assert!(w.linvel(id).y.abs() < 0.1);
    }

    #[test]
    fn test_hinge_holds_bodies_together() {
        let mut w = world();
        w.gravity = Vec2::ZERO;
        let a = ball(&mut w, Vec2::ZERO, 5.0, 0.4);
        let b = ball(&mut w, Vec2::new(1.0, 0.0), 5.0, 0.4);
        let j = w.add_hinge(a, b, Vec2::new(0.5, 0.0), 0.3, 1e-4);
        for _ in 0..300 {
            w.add_force(b, Vec2::new(0.0, -50.0));
            w.step(DT);
        }
        let gap = (w.position(b) - w.position(a)).length();
        assert!((gap - 1.0).abs() < 0.05, "gap = {gap}");
        // Locked: b cannot swing around the hinge
        assert!(w.hinge_angle(j).abs() < 0.1);
    }

    #[test]
    fn test_hinge_limits_can_be_opened() {
        let mut w = world();
        let a = ball(&mut w, Vec2::ZERO, 5.0, 0.4);
        let b = ball(&mut w, Vec2::new(1.0, 0.0), 5.0, 0.4);
        let j = w.add_hinge(a, b, Vec2::new(0.5, 0.0), 0.3, 1e-4);
        let lim = w.hinge_limits(j);
        assert!(lim.is_locked());
        assert_eq!((lim.lo, lim.hi), (0.0, 0.0));
        w.set_hinge_limits(j, HingeLimits { lo: -1.0, hi: 1.0, erp: 0.3, cfm: 1e-4 });
        assert!(!w.hinge_limits(j).is_locked());
        assert_eq!(w.hinge_limits(j).hi, 1.0);
    }

    #[test]
    fn test_step_is_deterministic() {
        let build = || {
            let mut w = world();
            let a = w.add_body(Vec2::ZERO, 5.0, MassShape::Box { lx: 0.5, ly: 1.0 });
            let b = ball(&mut w, Vec2::new(0.3, 0.7), 5.0, 0.4);
            w.add_hinge(a, b, Vec2::new(0.2, 0.4), 0.3, 1e-4);
            (w, a, b)
        };
        let (mut w1, a, b) = build();
        let (mut w2, _, _) = build();
        for _ in 0..50 {
            w1.add_torque(a, 50.0);
            w2.add_torque(a, 50.0);
            w1.step(DT);
            w2.step(DT);
        }
        assert_eq!(w1.position(a), w2.position(a));
        assert_eq!(w1.angle(b), w2.angle(b));
    }
}
