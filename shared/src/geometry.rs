use crate::vec3::{Axis, Vec3};

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Box centred on `center` with full extents `size`.
    pub fn from_center_size(center: Vec3, size: Vec3) -> Self {
        Self {
            min: Vec3::new(
                center.x - size.x / 2.0,
                center.y - size.y / 2.0,
                center.z - size.z / 2.0,
            ),
            max: Vec3::new(
                center.x + size.x / 2.0,
                center.y + size.y / 2.0,
                center.z + size.z / 2.0,
            ),
        }
    }

    pub fn center(&self) -> Vec3 {
        Vec3::new(
            (self.min.x + self.max.x) / 2.0,
            (self.min.y + self.max.y) / 2.0,
            (self.min.z + self.max.z) / 2.0,
        )
    }

    /// Strict overlap test; boxes that only touch do not overlap.
    pub fn overlaps(&self, other: &Aabb) -> bool {
        Axis::ALL.into_iter().all(|axis| {
            self.max.get(axis) > other.min.get(axis) && self.min.get(axis) < other.max.get(axis)
        })
    }

    /// Penetration depth along one axis (positive when overlapping on that axis).
    pub fn overlap_on(&self, other: &Aabb, axis: Axis) -> f64 {
        self.max.get(axis).min(other.max.get(axis)) - self.min.get(axis).max(other.min.get(axis))
    }

    pub fn translated(&self, delta: Vec3) -> Aabb {
        Aabb {
            min: crate::vec3::add(self.min, delta),
            max: crate::vec3::add(self.max, delta),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vec3::vec3;

    #[test]
    fn from_center_size_spans_half_extents() {
        let b = Aabb::from_center_size(vec3(0.0, 0.0, 10.0), vec3(4.0, 0.5, 2.0));
        assert_eq!(b.min, vec3(-2.0, -0.25, 9.0));
        assert_eq!(b.max, vec3(2.0, 0.25, 11.0));
        assert_eq!(b.center(), vec3(0.0, 0.0, 10.0));
    }

    #[test]
    fn touching_boxes_do_not_overlap() {
        let a = Aabb::new(vec3(0.0, 0.0, 0.0), vec3(1.0, 1.0, 1.0));
        let b = Aabb::new(vec3(1.0, 0.0, 0.0), vec3(2.0, 1.0, 1.0));
        assert!(!a.overlaps(&b));
        assert!(!b.overlaps(&a));
    }

    #[test]
    fn nested_boxes_overlap() {
        let outer = Aabb::new(vec3(-5.0, -5.0, -5.0), vec3(5.0, 5.0, 5.0));
        let inner = Aabb::new(vec3(-1.0, -1.0, -1.0), vec3(1.0, 1.0, 1.0));
        assert!(outer.overlaps(&inner));
        assert!(inner.overlaps(&outer));
    }

    #[test]
    fn overlap_depth_per_axis() {
        let a = Aabb::new(vec3(0.0, 0.0, 0.0), vec3(2.0, 2.0, 2.0));
        let b = Aabb::new(vec3(1.5, 1.0, -3.0), vec3(4.0, 4.0, 0.5));
        assert!((a.overlap_on(&b, Axis::X) - 0.5).abs() < 1e-12);
        assert!((a.overlap_on(&b, Axis::Y) - 1.0).abs() < 1e-12);
        assert!((a.overlap_on(&b, Axis::Z) - 0.5).abs() < 1e-12);
    }
}
