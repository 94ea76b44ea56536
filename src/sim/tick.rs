//! Fixed timestep bike physics
//!
//! `PlayerBiker` owns the rigid-body world of one bike + rider and advances
//! it one tick at a time. Each tick returns the events it produced instead
//! of calling into sound or rendering code.

use std::mem;

use glam::Vec2;

use super::collision::CollisionSurface;
use super::controller::{BikeInput, Controller};
use super::rig::BikeRig;
use super::somersault::SomersaultCounter;
use super::state::{BikeState, BikerEvent, DriveDir, Side, Wheel, head_position};
use super::world::{BodyId, HingeLimits, JointId, MassShape, World};
use crate::consts::*;
use crate::settings::PhysicsSettings;

/// Body part circles are this big when it comes to mass distribution
const BODY_PART_RADIUS: f32 = 0.4;

/// Wheel angular velocity above which a throttling wheel counts as spinning
const WHEEL_SPIN_VELOCITY: f32 = 5.0;

/// A force pushing the frame during [start, end]; `end == 0` means forever
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExternalForce {
    pub start: i32,
    pub end: i32,
    pub force: Vec2,
}

impl ExternalForce {
    fn is_active(&self, time: i32) -> bool {
        self.start <= time && (self.end == 0 || self.end >= time)
    }

    fn is_expired(&self, time: i32) -> bool {
        self.end != 0 && self.end < time
    }
}

#[derive(Debug, Clone, Copy)]
struct BikeBodies {
    front_wheel: BodyId,
    rear_wheel: BodyId,
    frame: BodyId,
}

#[derive(Debug, Clone, Copy)]
struct RiderBodies {
    torso: BodyId,
    lower_leg: BodyId,
    upper_leg: BodyId,
    lower_arm: BodyId,
    upper_arm: BodyId,
    foot_anchor: BodyId,
    hand_anchor: BodyId,
}

#[derive(Debug, Clone, Copy)]
struct RiderHinges {
    knee: JointId,
    lower_body: JointId,
    shoulder: JointId,
    elbow: JointId,
    foot: JointId,
    hand: JointId,
}

/// Joint angle range once the rider goes limp, for the right-facing side
const DETACHED_LIMITS: [(f32, f32); 4] = [
    (0.0, std::f32::consts::FRAC_PI_2), // knee
    (-1.4, -1.2),                       // lower body
    (-1.9, 0.8),                        // shoulder
    (-1.5, 1.0),                        // elbow
];

/// Locally simulated bike + rider
#[derive(Debug)]
pub struct PlayerBiker {
    settings: PhysicsSettings,
    rig: BikeRig,
    state: BikeState,
    controller: Controller,
    world: World,
    bike: BikeBodies,
    rider: [RiderBodies; 2],
    hinges: [RiderHinges; 2],

    still_frames: u32,
    sleeping: bool,
    clear_dynamic_touched: bool,
    first_update: bool,

    next_attitude_con: f32,
    attitude_con: f32,
    last_attitude_dir: f32,

    front_wheel_touching: bool,
    rear_wheel_touching: bool,
    wheel_detach: bool,
    body_detach: bool,
    dead: bool,
    finished: bool,
    change_dir_per: f32,

    external_forces: Vec<ExternalForce>,
    prev_front_wheel: Vec2,
    prev_rear_wheel: Vec2,
    prev_heads: [Vec2; 2],
    prev_active_head: Vec2,

    somersault: SomersaultCounter,
    collision_points: Vec<Vec2>,
    pending_events: Vec<BikerEvent>,
}

impl PlayerBiker {
    /// Create a biker standing at `position` (ground contact point)
    pub fn new(settings: PhysicsSettings, position: Vec2, dir: DriveDir) -> Self {
        let rig = BikeRig::from_settings(&settings);
        let gravity = Vec2::new(0.0, settings.world_gravity);
        let (world, bike, rider, hinges) = build_world(&settings, &rig, position, gravity);
        let mut biker = Self {
            settings,
            rig,
            state: BikeState::new(),
            controller: Controller::default(),
            world,
            bike,
            rider,
            hinges,
            still_frames: 0,
            sleeping: false,
            clear_dynamic_touched: false,
            first_update: true,
            next_attitude_con: -1000.0,
            attitude_con: 0.0,
            last_attitude_dir: 0.0,
            front_wheel_touching: false,
            rear_wheel_touching: false,
            wheel_detach: false,
            body_detach: false,
            dead: false,
            finished: false,
            change_dir_per: 1.0,
            external_forces: Vec::new(),
            prev_front_wheel: Vec2::ZERO,
            prev_rear_wheel: Vec2::ZERO,
            prev_heads: [Vec2::ZERO; 2],
            prev_active_head: Vec2::ZERO,
            somersault: SomersaultCounter::new(),
            collision_points: Vec::new(),
            pending_events: Vec::new(),
        };
        biker.init_to_position(position, dir, gravity);
        biker
    }

    /// Rebuild the rig at `position` facing `dir`, clearing all run state
    pub fn init_to_position(&mut self, position: Vec2, dir: DriveDir, gravity: Vec2) {
        self.state.clear();
        self.rig.params = super::rig::BikeParameters::from_settings(&self.settings);
        self.rig.reinitialize_anchors();

        let (world, bike, rider, hinges) = build_world(&self.settings, &self.rig, position, gravity);
        self.world = world;
        self.bike = bike;
        self.rider = rider;
        self.hinges = hinges;

        self.still_frames = 0;
        self.sleeping = false;
        self.clear_dynamic_touched = false;
        self.first_update = true;
        self.next_attitude_con = -1000.0;
        self.attitude_con = 0.0;
        self.last_attitude_dir = 0.0;
        self.front_wheel_touching = false;
        self.rear_wheel_touching = false;
        self.wheel_detach = false;
        self.dead = false;
        self.finished = false;
        self.change_dir_per = 1.0;
        self.external_forces.clear();
        self.somersault = SomersaultCounter::new();
        self.collision_points.clear();
        self.pending_events.clear();

        self.set_body_detach(false);
        self.state.dir = dir;
        self.update_game_state();

        self.prev_front_wheel = self.state.front_wheel;
        self.prev_rear_wheel = self.state.rear_wheel;
        self.prev_heads = [self.state.sides[0].head, self.state.sides[1].head];
        self.prev_active_head = self.state.active().head;
        log::debug!("Biker initialized at ({:.2}, {:.2}) facing {:?}", position.x, position.y, dir);
    }

    // === Accessors ===

    pub fn state(&self) -> &BikeState {
        &self.state
    }

    pub fn rig(&self) -> &BikeRig {
        &self.rig
    }

    pub fn settings(&self) -> &PhysicsSettings {
        &self.settings
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    pub fn set_controller(&mut self, controller: Controller) {
        self.controller = controller;
    }

    /// Shorthand for a local controller with `input`
    pub fn set_input(&mut self, input: BikeInput) {
        self.controller = Controller::LocalInput(input);
    }

    pub fn is_sleeping(&self) -> bool {
        self.sleeping
    }

    pub fn is_dead(&self) -> bool {
        self.dead
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn is_wheel_detached(&self) -> bool {
        self.wheel_detach
    }

    pub fn is_body_detached(&self) -> bool {
        self.body_detach
    }

    /// Direction change blend in [0, 1]
    pub fn change_dir_per(&self) -> f32 {
        self.change_dir_per
    }

    /// Contact points found during the last tick
    pub fn collision_points(&self) -> &[Vec2] {
        &self.collision_points
    }

    pub fn external_forces(&self) -> &[ExternalForce] {
        &self.external_forces
    }

    pub fn somersaults(&self) -> u32 {
        self.somersault.count()
    }

    /// Frame angle in [0, 2π)
    pub fn angle(&self) -> f32 {
        self.state.frame_angle()
    }

    // === State changes ===

    pub fn set_dead(&mut self, dead: bool) {
        if dead && !self.dead {
            self.pending_events.push(BikerEvent::Died);
        }
        self.dead = dead;
    }

    pub fn set_finished(&mut self, finished: bool) {
        self.finished = finished;
    }

    pub fn reset_auto_disabler(&mut self) {
        self.still_frames = 0;
    }

    /// Release (or re-lock) the rider's joints
    pub fn set_body_detach(&mut self, detach: bool) {
        self.body_detach = detach;
        let erp = self.settings.rider_anchors_erp;
        let cfm = self.settings.rider_anchors_cfm;
        for side in Side::ALL {
            let h = self.hinges[side.index()];
            for (joint, (lo, hi)) in [h.knee, h.lower_body, h.shoulder, h.elbow]
                .into_iter()
                .zip(DETACHED_LIMITS)
            {
                let limits = if !detach {
                    HingeLimits::locked(0.0, erp, cfm)
                } else {
                    match side {
                        Side::Primary => HingeLimits { lo, hi, erp, cfm },
                        Side::Mirrored => HingeLimits {
                            lo: -hi,
                            hi: -lo,
                            erp,
                            cfm,
                        },
                    }
                };
                self.world.set_hinge_limits(joint, limits);
            }
        }
    }

    /// Queue a force on the frame. `start` and `end` are relative to
    /// `time`; an `end` of 0 keeps the force forever.
    pub fn add_body_force(&mut self, time: i32, force: Vec2, start: i32, end: i32) {
        self.external_forces.push(ExternalForce {
            start: time + start,
            end: if end == 0 { 0 } else { time + end },
            force,
        });
    }

    /// Sum of the forces active at `time`; expired ones are dropped
    fn determine_force_to_add(&mut self, time: i32) -> Vec2 {
        let total = self
            .external_forces
            .iter()
            .filter(|f| f.is_active(time))
            .fold(Vec2::ZERO, |acc, f| acc + f.force);
        self.external_forces.retain(|f| !f.is_expired(time));
        total
    }

    // === Speeds ===

    /// km/h, from how far the wheels moved during the last tick
    pub fn bike_linear_vel(&self) -> f32 {
        let current = self.state.rear_wheel + self.state.front_wheel;
        let last = self.prev_rear_wheel + self.prev_front_wheel;
        speed_from_delta(current - last)
    }

    /// km/h of the active head during the last tick
    pub fn torso_velocity(&self) -> f32 {
        let side = self.state.active_side().index();
        speed_from_delta(self.state.sides[side].head - self.prev_heads[side])
    }

    /// km/h at the rim of the driven wheel
    pub fn bike_engine_speed(&self) -> f32 {
        let w = match self.state.dir {
            DriveDir::Right => self.rear_wheel_velocity(),
            DriveDir::Left => self.front_wheel_velocity(),
        };
        (w * self.settings.wheel_radius * 3.6).abs()
    }

    pub fn front_wheel_velocity(&self) -> f32 {
        self.world.angvel(self.bike.front_wheel)
    }

    pub fn rear_wheel_velocity(&self) -> f32 {
        self.world.angvel(self.bike.rear_wheel)
    }

    // === Tick ===

    /// Advance one tick of `time_step` hundredths ending at `time`
    pub fn update_to_time<S: CollisionSurface>(
        &mut self,
        time: i32,
        time_step: i32,
        surface: &mut S,
    ) -> Vec<BikerEvent> {
        let mut events = mem::take(&mut self.pending_events);
        self.change_dir_per = (self.change_dir_per + time_step as f32 * 3.0 / 100.0).min(1.0);

        self.update_physics(time, time_step, surface, &mut events);
        self.update_game_state();
        self.state.game_time = time;

        if self.dead || self.finished {
            return events;
        }

        if self.controller.change_dir() {
            if let Controller::LocalInput(input) = &mut self.controller {
                input.change_dir = false;
            }
            self.state.dir = self.state.dir.flipped();
            self.change_dir_per = 0.0;
            self.somersault.reset();
        }

        if let Some(counter_clockwise) = self.somersault.update(self.angle()) {
            events.push(BikerEvent::SomersaultCompleted { counter_clockwise });
        }
        events
    }

    fn enable_bike(&mut self) {
        for id in [self.bike.front_wheel, self.bike.rear_wheel, self.bike.frame] {
            self.world.set_enabled(id, true);
        }
    }

    fn is_still(&self) -> bool {
        [self.bike.front_wheel, self.bike.rear_wheel, self.bike.frame]
            .iter()
            .all(|id| {
                let v = self.world.linvel(*id);
                v.x.abs() < SLEEP_EPS && v.y.abs() < SLEEP_EPS
            })
    }

    fn update_physics<S: CollisionSurface>(
        &mut self,
        time: i32,
        time_step: i32,
        surface: &mut S,
        events: &mut Vec<BikerEvent>,
    ) {
        self.collision_points.clear();
        let alive = !self.dead && !self.finished;
        let input = if alive { self.controller.input() } else { BikeInput::default() };
        let s = &self.settings;
        let (spring, damp) = (s.suspension_spring, s.suspension_damp);
        let vel_max = s.wheel_roll_velocity_max;

        // Auto-disable
        if self.is_still() {
            self.still_frames += 1;
        } else {
            self.still_frames = 0;
        }
        let was_sleeping = self.sleeping;
        self.sleeping = self.still_frames >= SLEEP_FRAMES && !self.clear_dynamic_touched;
        for id in [self.bike.front_wheel, self.bike.rear_wheel, self.bike.frame] {
            self.world.set_enabled(id, !self.sleeping);
        }

        // External forces wake the bike up on the spot
        let external = self.determine_force_to_add(time);
        if external != Vec2::ZERO {
            self.reset_auto_disabler();
            self.sleeping = false;
            self.enable_bike();
            self.world.add_force(self.bike.frame, external);
        }
        if self.sleeping != was_sleeping {
            log::debug!("Biker {} at t={time}", if self.sleeping { "sleeps" } else { "wakes" });
        }

        // Suspension
        if !self.sleeping {
            let front_delta = self.state.relaxed_front_wheel - self.state.front_wheel;
            let front_vel = front_delta - self.state.prev_front_delta;
            let front_force = front_delta * spring + front_vel * damp;
            if !self.wheel_detach || self.state.dir == DriveDir::Left {
                self.world.add_force(self.bike.front_wheel, front_force);
                self.world
                    .add_force_at_pos(self.bike.frame, -front_force, self.state.relaxed_front_wheel);
            }
            self.state.prev_front_delta = front_delta;

            let rear_delta = self.state.relaxed_rear_wheel - self.state.rear_wheel;
            let rear_vel = rear_delta - self.state.prev_rear_delta;
            let rear_force = rear_delta * spring + rear_vel * damp;
            if !self.wheel_detach || self.state.dir == DriveDir::Right {
                self.world.add_force(self.bike.rear_wheel, rear_force);
                self.world
                    .add_force_at_pos(self.bike.frame, -rear_force, self.state.relaxed_rear_wheel);
            }
            self.state.prev_rear_delta = rear_delta;

            let squeek = front_vel.length().max(rear_vel.length());
            if squeek > SQUEEK_POINT {
                events.push(BikerEvent::Squeeking(((squeek - SQUEEK_POINT) / SQUEEK_RANGE).min(1.0)));
            }
        }

        // Attitude
        let now = time as f32 / 100.0;
        if alive
            && input.pull != 0.0
            && (now > self.next_attitude_con || input.pull * self.last_attitude_dir < 0.0)
        {
            self.attitude_con = input.pull * self.settings.attitude_torque;
            self.last_attitude_dir = self.attitude_con;
            self.next_attitude_con = now + 0.6 * input.pull.abs();
        }
        if self.attitude_con != 0.0 {
            self.still_frames = 0;
            self.enable_bike();
            self.world.add_torque(self.bike.frame, self.attitude_con);
        }
        self.attitude_con *= self.settings.attitude_defactor;
        if self.attitude_con.abs() < 100.0 {
            self.attitude_con = 0.0;
        }

        let rear_w = self.rear_wheel_velocity();
        let front_w = self.front_wheel_velocity();
        let s = &self.settings;

        // Rolling resistance, stronger past the soft speed cap
        if !self.sleeping {
            for (id, w) in [(self.bike.rear_wheel, rear_w), (self.bike.front_wheel, front_w)] {
                let resistance = if w.abs() < vel_max {
                    s.wheel_roll_resistance
                } else {
                    s.wheel_roll_resistance_max
                };
                self.world.add_torque(id, -w * resistance);
            }
        }

        if alive {
            let driven = match self.state.dir {
                DriveDir::Right => (-rear_w).max(0.0),
                DriveDir::Left => front_w.max(0.0),
            };
            let rpm = s.engine_rpm_min + s.engine_rpm_span() * (driven / vel_max) * input.drive;
            self.state.engine_rpm = rpm.clamp(s.engine_rpm_min, s.engine_rpm_max);

            let engine = self.rig.params.engine_power_max * s.engine_damp * input.drive;
            if input.drive < 0.0 {
                if !self.sleeping {
                    let brake = s.brake_factor * input.drive;
                    self.world.add_torque(self.bike.rear_wheel, rear_w * brake);
                    self.world.add_torque(self.bike.front_wheel, front_w * brake);
                }
            } else if input.drive > 0.0 {
                match self.state.dir {
                    DriveDir::Right if rear_w > -vel_max => {
                        self.still_frames = 0;
                        self.enable_bike();
                        self.world.add_torque(self.bike.rear_wheel, -engine);
                    }
                    DriveDir::Left if front_w < vel_max => {
                        self.still_frames = 0;
                        self.enable_bike();
                        self.world.add_torque(self.bike.front_wheel, engine);
                    }
                    _ => {}
                }
            }
        }

        // Wheel contacts
        surface.clear_dynamic_touched();
        for wheel in [Wheel::Front, Wheel::Rear] {
            self.collide_wheel(wheel, surface, alive, input.drive, events);
        }

        // Limp rider limbs
        if self.body_detach {
            self.collide_detached_body(surface);
        }

        // Head
        let side = self.state.active_side();
        let head = self.state.side(side).head;
        let head_hit = surface.check_circle(head, self.rig.params.head_size)
            || (!self.first_update && !surface.collide_line(self.prev_active_head, head).is_empty());
        if head_hit {
            events.push(BikerEvent::HeadTouched);
        }
        self.prev_active_head = head;
        self.prev_front_wheel = self.state.front_wheel;
        self.prev_rear_wheel = self.state.rear_wheel;
        self.prev_heads = [self.state.sides[0].head, self.state.sides[1].head];

        // Rider springs, both sides
        let (rspring, rdamp) = (self.settings.rider_spring, self.settings.rider_damp);
        for side in Side::ALL {
            let i = side.index();
            let pose = &mut self.state.sides[i];
            let foot_delta = pose.wanted_foot - pose.foot;
            let foot_force = foot_delta * rspring + (foot_delta - pose.prev_foot_delta) * rdamp;
            pose.prev_foot_delta = foot_delta;
            let hand_delta = pose.wanted_hand - pose.hand;
            let hand_force = hand_delta * rspring + (hand_delta - pose.prev_hand_delta) * rdamp;
            pose.prev_hand_delta = hand_delta;
            if !self.body_detach {
                self.world.add_force(self.rider[i].foot_anchor, foot_force);
                self.world.add_force(self.rider[i].hand_anchor, hand_force);
            }
        }

        let dt = time_step as f32 / 100.0 * self.settings.sim_speed_factor;
        self.world.step(dt);
        self.world.clear_contacts();

        self.clear_dynamic_touched = surface.is_dynamic_touched();
        self.first_update = false;
    }

    fn collide_wheel<S: CollisionSurface>(
        &mut self,
        wheel: Wheel,
        surface: &mut S,
        alive: bool,
        drive: f32,
        events: &mut Vec<BikerEvent>,
    ) {
        let (id, center) = match wheel {
            Wheel::Front => (self.bike.front_wheel, self.state.front_wheel),
            Wheel::Rear => (self.bike.rear_wheel, self.state.rear_wheel),
        };
        let contacts = surface.collide_circle(center, self.settings.wheel_radius);
        let touching = !contacts.is_empty();
        let was_touching = match wheel {
            Wheel::Front => mem::replace(&mut self.front_wheel_touching, touching),
            Wheel::Rear => mem::replace(&mut self.rear_wheel_touching, touching),
        };
        if touching != was_touching {
            events.push(BikerEvent::WheelTouched { wheel, touching });
        }
        if surface.is_dynamic_touched() {
            self.enable_bike();
        }
        if touching && self.dead && self.bike_linear_vel() > self.settings.dead_wheel_detach_speed {
            self.wheel_detach = true;
        }
        if !self.world.is_enabled(id) {
            return;
        }

        let s = &self.settings;
        let (mu, erp, cfm) = (s.wheel_grip, s.wheel_erp, s.wheel_cfm);
        for contact in &contacts {
            self.world.add_contact(id, *contact, mu, erp, cfm);
            self.collision_points.push(contact.point);
        }

        let driven = matches!(
            (wheel, self.state.dir),
            (Wheel::Front, DriveDir::Left) | (Wheel::Rear, DriveDir::Right)
        );
        let w = self.world.angvel(id);
        if let Some(last) = contacts.last()
            && driven
            && alive
            && w.abs() > WHEEL_SPIN_VELOCITY
            && drive > 0.0
        {
            let d = center - last.point;
            let direction = match wheel {
                Wheel::Front => Vec2::new(d.y + d.x, -d.x + d.y) * 0.5,
                Wheel::Rear => Vec2::new(-d.y + d.x, d.x + d.y) * 0.5,
            };
            events.push(BikerEvent::WheelSpinning {
                position: last.point,
                direction,
            });
        }
    }

    fn collide_detached_body<S: CollisionSurface>(&mut self, surface: &mut S) {
        let side = self.state.active_side();
        let pose = *self.state.side(side);
        let r = self.rider[side.index()];
        let limbs: [(Vec2, &[BodyId]); 6] = [
            (pose.shoulder, &[r.torso, r.upper_arm]),
            (pose.lower_body, &[r.torso, r.upper_leg]),
            (pose.elbow, &[r.upper_arm, r.lower_arm]),
            (pose.hand, &[r.lower_arm]),
            (pose.knee, &[r.upper_leg, r.lower_leg]),
            (pose.foot, &[r.lower_leg]),
        ];
        let (erp, cfm) = (self.settings.world_erp, self.settings.world_cfm);
        for (point, bodies) in limbs {
            for contact in surface.collide_circle(point, MEMBER_RADIUS) {
                for body in bodies {
                    self.world.add_contact(*body, contact, DETACH_GRIP, erp, cfm);
                }
                self.collision_points.push(contact.point);
            }
        }
    }

    /// Read the world back into the pose
    fn update_game_state(&mut self) {
        let (frame, front, rear) = (self.bike.frame, self.bike.front_wheel, self.bike.rear_wheel);
        self.state.center = self.world.position(frame);
        self.state.frame_rot = self.world.rotation(frame);
        self.state.front_wheel = self.world.position(front);
        self.state.front_wheel_rot = self.world.rotation(front);
        self.state.rear_wheel = self.world.position(rear);
        self.state.rear_wheel_rot = self.world.rotation(rear);
        self.state.update_frame_anchors(&self.rig);

        let neck = self.rig.params.neck_length;
        for side in Side::ALL {
            let h = self.hinges[side.index()];
            let pose = self.state.side_mut(side);
            pose.hand = self.world.hinge_anchor(h.hand);
            pose.elbow = self.world.hinge_anchor(h.elbow);
            pose.shoulder = self.world.hinge_anchor(h.shoulder);
            pose.lower_body = self.world.hinge_anchor(h.lower_body);
            pose.knee = self.world.hinge_anchor(h.knee);
            pose.foot = self.world.hinge_anchor(h.foot);
            pose.head = head_position(pose.shoulder, pose.lower_body, neck);
        }
    }
}

fn speed_from_delta(delta: Vec2) -> f32 {
    let speed = 3.6 * 100.0 * delta.length() / PHYS_STEP_SIZE as f32;
    if speed > MAX_REPORTED_SPEED { 0.0 } else { speed }
}

fn build_world(
    settings: &PhysicsSettings,
    rig: &BikeRig,
    position: Vec2,
    gravity: Vec2,
) -> (World, BikeBodies, [RiderBodies; 2], [RiderHinges; 2]) {
    let dt = PHYS_STEP_SIZE as f32 / 100.0 * settings.sim_speed_factor;
    let mut world = World::new(gravity, dt, settings.sim_iterations);
    let anchors = &rig.anchors;
    let params = &rig.params;
    let start = position - anchors.ground_point;

    let wheel_shape = MassShape::Sphere {
        radius: params.wheel_radius,
    };
    let rear_wheel = world.add_body(start + anchors.rear_wheel, params.wheel_mass, wheel_shape);
    let front_wheel = world.add_body(start + anchors.front_wheel, params.wheel_mass, wheel_shape);
    let frame = world.add_body(
        start,
        params.frame_mass,
        MassShape::Box {
            lx: settings.frame_inertial_length,
            ly: settings.frame_inertial_height,
        },
    );
    let bike = BikeBodies {
        front_wheel,
        rear_wheel,
        frame,
    };

    let part = MassShape::Sphere {
        radius: BODY_PART_RADIUS,
    };
    let (erp, cfm) = (settings.rider_anchors_erp, settings.rider_anchors_cfm);
    let mut rider = Vec::with_capacity(2);
    let mut hinges = Vec::with_capacity(2);
    for side in Side::ALL {
        let a = anchors.rider[side.index()];
        let j = params.joints.for_side(side);
        let mut body = |offset: Vec2, mass: f32| world.add_body(start + offset, mass, part);
        let bodies = RiderBodies {
            torso: body(a.torso, params.torso_mass),
            lower_leg: body(a.lower_leg, params.lower_leg_mass),
            upper_leg: body(a.upper_leg, params.upper_leg_mass),
            lower_arm: body(a.lower_arm, params.lower_arm_mass),
            upper_arm: body(a.upper_arm, params.upper_arm_mass),
            foot_anchor: body(a.foot, params.foot_mass),
            hand_anchor: body(a.hand, params.hand_mass),
        };
        hinges.push(RiderHinges {
            knee: world.add_hinge(bodies.lower_leg, bodies.upper_leg, start + j.knee, erp, cfm),
            lower_body: world.add_hinge(bodies.upper_leg, bodies.torso, start + j.lower_body, erp, cfm),
            shoulder: world.add_hinge(bodies.torso, bodies.upper_arm, start + j.shoulder, erp, cfm),
            elbow: world.add_hinge(bodies.upper_arm, bodies.lower_arm, start + j.elbow, erp, cfm),
            foot: world.add_hinge(bodies.foot_anchor, bodies.lower_leg, start + j.foot, erp, cfm),
            hand: world.add_hinge(bodies.lower_arm, bodies.hand_anchor, start + j.hand, erp, cfm),
        });
        rider.push(bodies);
    }

    (world, bike, [rider[0], rider[1]], [hinges[0], hinges[1]])
}
