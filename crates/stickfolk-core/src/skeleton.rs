//! Forward-kinematic bone chains stored as an index arena.

use serde::{Deserialize, Serialize};
use std::f32::consts::FRAC_PI_2;
use thiserror::Error;

use crate::geometry::Position;

/// Errors raised while wiring a skeleton.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SkeletonError {
    /// The referenced link does not exist in this skeleton.
    #[error("unknown link {0}")]
    UnknownLink(usize),
    /// Parenting `link` under `parent` would make a link its own ancestor.
    #[error("parenting link {link} under {parent} would create a cycle")]
    CyclicParent { link: usize, parent: usize },
}

/// Index of a link inside its owning [`Skeleton`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkId(pub usize);

/// Rigid segment with a world-space angle, optionally hanging off a parent's end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub length: f32,
    pub angle: f32,
    pub parent: Option<LinkId>,
    /// Start point used only while the link has no parent.
    pub root: Position,
}

/// Arena of links; parents are referenced by index so chains can never own each other.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Skeleton {
    links: Vec<Link>,
}

impl Skeleton {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.links.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Add a parentless link. Its root must be positioned with [`Skeleton::set_root`].
    pub fn add_root(&mut self, length: f32, angle: f32) -> LinkId {
        self.links.push(Link {
            length,
            angle,
            parent: None,
            root: Position::ORIGIN,
        });
        LinkId(self.links.len() - 1)
    }

    /// Add a link whose start follows the end of `parent`.
    pub fn add_child(
        &mut self,
        parent: LinkId,
        length: f32,
        angle: f32,
    ) -> Result<LinkId, SkeletonError> {
        self.check(parent)?;
        self.links.push(Link {
            length,
            angle,
            parent: Some(parent),
            root: Position::ORIGIN,
        });
        Ok(LinkId(self.links.len() - 1))
    }

    /// Re-parent `link`, refusing any assignment that would make it its own ancestor.
    pub fn set_parent(&mut self, link: LinkId, parent: Option<LinkId>) -> Result<(), SkeletonError> {
        self.check(link)?;
        if let Some(parent) = parent {
            self.check(parent)?;
            let mut cursor = Some(parent);
            while let Some(current) = cursor {
                if current == link {
                    return Err(SkeletonError::CyclicParent {
                        link: link.0,
                        parent: parent.0,
                    });
                }
                cursor = self.links[current.0].parent;
            }
        }
        self.links[link.0].parent = parent;
        Ok(())
    }

    fn check(&self, link: LinkId) -> Result<(), SkeletonError> {
        if link.0 < self.links.len() {
            Ok(())
        } else {
            Err(SkeletonError::UnknownLink(link.0))
        }
    }

    #[must_use]
    pub fn link(&self, link: LinkId) -> &Link {
        &self.links[link.0]
    }

    pub fn set_root(&mut self, link: LinkId, root: Position) {
        self.links[link.0].root = root;
    }

    pub fn set_angle(&mut self, link: LinkId, angle: f32) {
        self.links[link.0].angle = angle;
    }

    #[must_use]
    pub fn angle(&self, link: LinkId) -> f32 {
        self.links[link.0].angle
    }

    #[must_use]
    pub fn length(&self, link: LinkId) -> f32 {
        self.links[link.0].length
    }

    /// Start point: the parent's end, or the explicit root for parentless links.
    #[must_use]
    pub fn start(&self, link: LinkId) -> Position {
        match self.links[link.0].parent {
            Some(parent) => self.end(parent),
            None => self.links[link.0].root,
        }
    }

    #[must_use]
    pub fn end(&self, link: LinkId) -> Position {
        let l = &self.links[link.0];
        self.start(link).offset(l.angle, l.length)
    }

    /// World-space `(start, end)` for every link in insertion order.
    #[must_use]
    pub fn segments(&self) -> Vec<(Position, Position)> {
        (0..self.links.len())
            .map(|idx| {
                let id = LinkId(idx);
                (self.start(id), self.end(id))
            })
            .collect()
    }

    /// Rigidly rotate the whole skeleton about `pivot`.
    pub fn rotate_about(&mut self, pivot: Position, delta: f32) {
        for link in &mut self.links {
            link.angle += delta;
            if link.parent.is_none() {
                link.root = link.root.rotate_about(pivot, delta);
            }
        }
    }
}

/// Named links of the ten-bone stick figure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StickmanRig {
    pub torso: LinkId,
    pub shoulders: LinkId,
    pub left_thigh: LinkId,
    pub left_shin: LinkId,
    pub right_thigh: LinkId,
    pub right_shin: LinkId,
    pub left_upper_arm: LinkId,
    pub left_lower_arm: LinkId,
    pub right_upper_arm: LinkId,
    pub right_lower_arm: LinkId,
}

impl StickmanRig {
    pub const TORSO_LENGTH: f32 = 30.0;
    pub const THIGH_LENGTH: f32 = 20.0;
    pub const SHIN_LENGTH: f32 = 20.0;
    pub const ARM_LENGTH: f32 = 15.0;

    /// Build the figure hanging straight down from `root` (the neck).
    pub fn build(root: Position) -> Result<(Skeleton, Self), SkeletonError> {
        let mut skeleton = Skeleton::new();
        let torso = skeleton.add_root(Self::TORSO_LENGTH, FRAC_PI_2);
        skeleton.set_root(torso, root);
        // Zero-length anchor re-rooted at the torso start every tick.
        let shoulders = skeleton.add_root(0.0, FRAC_PI_2);
        skeleton.set_root(shoulders, root);

        let left_thigh = skeleton.add_child(torso, Self::THIGH_LENGTH, FRAC_PI_2)?;
        let left_shin = skeleton.add_child(left_thigh, Self::SHIN_LENGTH, FRAC_PI_2)?;
        let right_thigh = skeleton.add_child(torso, Self::THIGH_LENGTH, FRAC_PI_2)?;
        let right_shin = skeleton.add_child(right_thigh, Self::SHIN_LENGTH, FRAC_PI_2)?;
        let left_upper_arm = skeleton.add_child(shoulders, Self::ARM_LENGTH, FRAC_PI_2)?;
        let left_lower_arm = skeleton.add_child(left_upper_arm, Self::ARM_LENGTH, FRAC_PI_2)?;
        let right_upper_arm = skeleton.add_child(shoulders, Self::ARM_LENGTH, FRAC_PI_2)?;
        let right_lower_arm = skeleton.add_child(right_upper_arm, Self::ARM_LENGTH, FRAC_PI_2)?;

        Ok((
            skeleton,
            Self {
                torso,
                shoulders,
                left_thigh,
                left_shin,
                right_thigh,
                right_shin,
                left_upper_arm,
                left_lower_arm,
                right_upper_arm,
                right_lower_arm,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Position, b: Position) -> bool {
        a.distance(b) < 1e-4
    }

    #[test]
    fn child_starts_at_parent_end() {
        let mut skeleton = Skeleton::new();
        let root = skeleton.add_root(10.0, 0.0);
        skeleton.set_root(root, Position::new(5.0, 5.0));
        let child = skeleton.add_child(root, 4.0, FRAC_PI_2).expect("child");
        assert!(approx(skeleton.start(child), Position::new(15.0, 5.0)));
        assert!(approx(skeleton.end(child), Position::new(15.0, 9.0)));
    }

    #[test]
    fn rejects_self_and_cyclic_parents() {
        let mut skeleton = Skeleton::new();
        let a = skeleton.add_root(1.0, 0.0);
        let b = skeleton.add_child(a, 1.0, 0.0).expect("b");
        let c = skeleton.add_child(b, 1.0, 0.0).expect("c");
        assert_eq!(
            skeleton.set_parent(a, Some(a)),
            Err(SkeletonError::CyclicParent { link: 0, parent: 0 })
        );
        assert_eq!(
            skeleton.set_parent(a, Some(c)),
            Err(SkeletonError::CyclicParent { link: 0, parent: 2 })
        );
        assert_eq!(skeleton.link(a).parent, None);
        skeleton.set_parent(c, Some(a)).expect("reparent leaf");
        assert_eq!(skeleton.link(c).parent, Some(a));
    }

    #[test]
    fn unknown_parent_is_rejected() {
        let mut skeleton = Skeleton::new();
        assert_eq!(
            skeleton.add_child(LinkId(3), 1.0, 0.0),
            Err(SkeletonError::UnknownLink(3))
        );
    }

    #[test]
    fn rig_has_ten_links_hanging_down() {
        let (skeleton, rig) = StickmanRig::build(Position::new(100.0, 50.0)).expect("rig");
        assert_eq!(skeleton.len(), 10);
        assert!(approx(skeleton.end(rig.torso), Position::new(100.0, 80.0)));
        assert!(approx(skeleton.end(rig.left_shin), Position::new(100.0, 120.0)));
        assert!(approx(skeleton.end(rig.right_lower_arm), Position::new(100.0, 80.0)));
    }

    #[test]
    fn rotate_about_preserves_link_lengths() {
        let (mut skeleton, rig) = StickmanRig::build(Position::new(0.0, 0.0)).expect("rig");
        skeleton.rotate_about(Position::new(0.0, 70.0), FRAC_PI_2);
        let (start, end) = (skeleton.start(rig.left_shin), skeleton.end(rig.left_shin));
        assert!((start.distance(end) - StickmanRig::SHIN_LENGTH).abs() < 1e-4);
        // The foot sat on the pivot, so it must stay there.
        assert!(approx(skeleton.end(rig.left_shin), Position::new(0.0, 70.0)));
    }
}
