//! Collision queries against level geometry
//!
//! The physics tick only needs three questions answered: which contacts a
//! circle makes, whether a swept line crosses geometry, and whether a
//! circle touches anything at all. `CollisionSurface` is that interface;
//! `SegmentLevel` is a plain line-segment implementation of it.

use glam::Vec2;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

/// One contact point between a body circle and the level
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    /// Contact point on the geometry
    pub point: Vec2,
    /// Unit normal pointing from the geometry toward the body
    pub normal: Vec2,
    /// Penetration depth (for position correction)
    pub depth: f32,
}

/// Level geometry as seen by the physics tick
pub trait CollisionSurface {
    /// Contacts of a circle with the geometry. Touching dynamic geometry
    /// sets the dynamic-touched flag.
    fn collide_circle(&mut self, center: Vec2, radius: f32) -> Vec<Contact>;

    /// Crossings of the segment `from -> to` with the geometry
    fn collide_line(&self, from: Vec2, to: Vec2) -> Vec<Contact>;

    /// Whether the circle overlaps any geometry
    fn check_circle(&self, center: Vec2, radius: f32) -> bool;

    fn clear_dynamic_touched(&mut self);

    fn is_dynamic_touched(&self) -> bool;
}

/// A level edge. Dynamic edges belong to moving blocks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub a: Vec2,
    pub b: Vec2,
    pub dynamic: bool,
}

impl Segment {
    pub fn new(a: Vec2, b: Vec2) -> Self {
        Self { a, b, dynamic: false }
    }

    /// Left-hand normal of a -> b (up for a left-to-right floor)
    pub fn normal(&self) -> Vec2 {
        (self.b - self.a).perp().try_normalize().unwrap_or(Vec2::Y)
    }

    pub fn closest_point(&self, p: Vec2) -> Vec2 {
        let ab = self.b - self.a;
        let len_sq = ab.length_squared();
        if len_sq <= f32::EPSILON {
            return self.a;
        }
        let t = ((p - self.a).dot(ab) / len_sq).clamp(0.0, 1.0);
        self.a + ab * t
    }
}

/// Contact between a circle and a segment, if they overlap
pub fn circle_segment_contact(center: Vec2, radius: f32, seg: &Segment) -> Option<Contact> {
    let closest = seg.closest_point(center);
    let delta = center - closest;
    let dist = delta.length();
    if dist >= radius {
        return None;
    }
    let normal = if dist > 1e-6 { delta / dist } else { seg.normal() };
    Some(Contact {
        point: closest,
        normal,
        depth: radius - dist,
    })
}

/// Intersection point of segments p -> p2 and q -> q2
pub fn segment_intersection(p: Vec2, p2: Vec2, q: Vec2, q2: Vec2) -> Option<Vec2> {
    let r = p2 - p;
    let s = q2 - q;
    let denom = r.perp_dot(s);
    if denom.abs() <= f32::EPSILON {
        return None;
    }
    let qp = q - p;
    let t = qp.perp_dot(s) / denom;
    let u = qp.perp_dot(r) / denom;
    if (0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u) {
        Some(p + r * t)
    } else {
        None
    }
}

/// Level made of line segments
#[derive(Debug, Clone, Default)]
pub struct SegmentLevel {
    pub segments: Vec<Segment>,
    dynamic_touched: bool,
}

impl SegmentLevel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_segment(&mut self, a: Vec2, b: Vec2, dynamic: bool) {
        self.segments.push(Segment { a, b, dynamic });
    }

    /// Chain consecutive points into segments
    pub fn from_polyline(points: &[Vec2]) -> Self {
        let segments = points.windows(2).map(|w| Segment::new(w[0], w[1])).collect();
        Self {
            segments,
            dynamic_touched: false,
        }
    }

    /// Horizontal floor at height `y` from `x_min` to `x_max`
    pub fn flat(y: f32, x_min: f32, x_max: f32) -> Self {
        Self::from_polyline(&[Vec2::new(x_min, y), Vec2::new(x_max, y)])
    }

    /// Seeded bumpy terrain starting flat at the origin
    pub fn random_terrain(seed: u64, length: f32, step: f32, roughness: f32) -> Self {
        let mut rng = Pcg32::seed_from_u64(seed);
        let step = step.max(0.1);
        let mut points = vec![Vec2::new(-10.0, 0.0), Vec2::new(5.0, 0.0)];
        let mut x = 5.0;
        let mut y = 0.0f32;
        while x < length {
            x += step;
            y += rng.random_range(-roughness..=roughness);
            points.push(Vec2::new(x, y));
        }
        Self::from_polyline(&points)
    }
}

impl CollisionSurface for SegmentLevel {
    fn collide_circle(&mut self, center: Vec2, radius: f32) -> Vec<Contact> {
        let mut contacts = Vec::new();
        for seg in &self.segments {
            if let Some(contact) = circle_segment_contact(center, radius, seg) {
                if seg.dynamic {
                    self.dynamic_touched = true;
                }
                contacts.push(contact);
            }
        }
        contacts
    }

    fn collide_line(&self, from: Vec2, to: Vec2) -> Vec<Contact> {
        self.segments
            .iter()
            .filter_map(|seg| {
                segment_intersection(from, to, seg.a, seg.b).map(|point| Contact {
                    point,
                    normal: seg.normal(),
                    depth: 0.0,
                })
            })
            .collect()
    }

    fn check_circle(&self, center: Vec2, radius: f32) -> bool {
        self.segments
            .iter()
            .any(|seg| seg.closest_point(center).distance_squared(center) < radius * radius)
    }

    fn clear_dynamic_touched(&mut self) {
        self.dynamic_touched = false;
    }

    fn is_dynamic_touched(&self) -> bool {
        self.dynamic_touched
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circle_on_floor() {
        let mut level = SegmentLevel::flat(0.0, -10.0, 10.0);
        let contacts = level.collide_circle(Vec2::new(1.0, 0.3), 0.35);
        assert_eq!(contacts.len(), 1);
        let c = contacts[0];
        assert!((c.normal - Vec2::Y).length() < 1e-6);
        assert!((c.depth - 0.05).abs() < 1e-5);
        assert_eq!(c.point, Vec2::new(1.0, 0.0));
        assert!(!level.is_dynamic_touched());
    }

    #[test]
    fn test_circle_miss() {
        let mut level = SegmentLevel::flat(0.0, -10.0, 10.0);
        assert!(level.collide_circle(Vec2::new(0.0, 1.0), 0.35).is_empty());
        assert!(!level.check_circle(Vec2::new(0.0, 1.0), 0.35));
        assert!(level.check_circle(Vec2::new(0.0, 0.1), 0.35));
    }

    #[test]
    fn test_dynamic_touch_flag() {
        let mut level = SegmentLevel::new();
        level.add_segment(Vec2::new(-1.0, 0.0), Vec2::new(1.0, 0.0), true);
        level.collide_circle(Vec2::new(0.0, 0.1), 0.2);
        assert!(level.is_dynamic_touched());
        level.clear_dynamic_touched();
        assert!(!level.is_dynamic_touched());
    }

    #[test]
    fn test_swept_line_crossing() {
        let level = SegmentLevel::flat(0.0, -10.0, 10.0);
        let hits = level.collide_line(Vec2::new(0.0, 1.0), Vec2::new(0.5, -1.0));
        assert_eq!(hits.len(), 1);
        assert!((hits[0].point - Vec2::new(0.25, 0.0)).length() < 1e-6);
        assert!(level.collide_line(Vec2::new(0.0, 1.0), Vec2::new(0.5, 0.5)).is_empty());
    }

    #[test]
    fn test_random_terrain_is_seeded() {
        let a = SegmentLevel::random_terrain(7, 100.0, 2.0, 0.3);
        let b = SegmentLevel::random_terrain(7, 100.0, 2.0, 0.3);
        assert_eq!(a.segments, b.segments);
        assert!(a.segments.len() > 40);
    }
}
