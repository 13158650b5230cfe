//! JSON scene descriptions
//!
//! A scene lists bodies, joints and soft bodies. Joints refer to bodies by
//! their position in the scene's `bodies` list.

use crate::body::{BodyDef, BodyId};
use crate::config::PhysicsConfig;
use crate::error::{PhysicsError, PhysicsResult};
use crate::joints::{JointDef, JointId};
use crate::soft_body::{SoftBodyDef, SoftBodyId};
use crate::world::PhysicsWorld;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

fn default_max_bodies() -> usize {
    1024
}

/// Serializable description of a world
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    /// World configuration, defaults when absent
    #[serde(default)]
    pub config: Option<PhysicsConfig>,
    #[serde(default = "default_max_bodies")]
    pub max_bodies: usize,
    #[serde(default)]
    pub bodies: Vec<BodyDef>,
    #[serde(default)]
    pub joints: Vec<JointDef>,
    #[serde(default)]
    pub soft_bodies: Vec<SoftBodyDef>,
}

/// Handles of everything a scene created, in scene order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SceneHandles {
    pub bodies: Vec<BodyId>,
    pub joints: Vec<JointId>,
    pub soft_bodies: Vec<SoftBodyId>,
}

impl Default for Scene {
    fn default() -> Self {
        Self {
            config: None,
            max_bodies: default_max_bodies(),
            bodies: Vec::new(),
            joints: Vec::new(),
            soft_bodies: Vec::new(),
        }
    }
}

impl Scene {
    pub fn new(max_bodies: usize) -> Self {
        Self {
            max_bodies,
            ..Self::default()
        }
    }

    pub fn from_json_str(json: &str) -> PhysicsResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a scene from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> PhysicsResult<Self> {
        let path = path.as_ref();
        info!(path = ?path, "Loading physics scene");
        let json = fs::read_to_string(path)?;
        let scene = Self::from_json_str(&json)?;
        info!(
            path = ?path,
            bodies = scene.bodies.len(),
            joints = scene.joints.len(),
            soft_bodies = scene.soft_bodies.len(),
            "Physics scene loaded"
        );
        Ok(scene)
    }

    pub fn to_json_string(&self) -> PhysicsResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Save the scene as pretty JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> PhysicsResult<()> {
        let path = path.as_ref();
        fs::write(path, self.to_json_string()?)?;
        info!(path = ?path, "Physics scene saved");
        Ok(())
    }

    /// Create a world holding everything in the scene
    pub fn build(&self) -> PhysicsResult<(PhysicsWorld, SceneHandles)> {
        let config = self.config.clone().unwrap_or_default();
        let mut world = PhysicsWorld::with_config(self.max_bodies, config)?;
        let mut handles = SceneHandles::default();

        for def in &self.bodies {
            handles.bodies.push(world.create_body(def.clone())?);
        }

        for def in &self.joints {
            let (a, b) = def.bodies();
            let resolve = |scene_index: BodyId| {
                handles.bodies.get(scene_index.index()).copied().ok_or_else(|| {
                    PhysicsError::InvalidDefinition(format!(
                        "joint refers to scene body {scene_index}, but the scene has {} bodies",
                        handles.bodies.len()
                    ))
                })
            };
            let def = def.clone().with_bodies(resolve(a)?, resolve(b)?);
            handles.joints.push(world.create_joint(def)?);
        }

        for def in &self.soft_bodies {
            handles.soft_bodies.push(world.create_soft_body_from_def(def)?);
        }

        debug!(
            bodies = handles.bodies.len(),
            joints = handles.joints.len(),
            soft_bodies = handles.soft_bodies.len(),
            "Built world from scene"
        );
        Ok((world, handles))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::{BodyType, Shape};

    const SCENE: &str = r#"{
        "max_bodies": 8,
        "bodies": [
            { "body_type": "Static", "shape": { "type": "Box", "half_width": 200.0, "half_height": 10.0 } },
            { "shape": { "type": "Circle", "radius": 10.0 }, "position": [0.0, 100.0] }
        ],
        "joints": [
            { "type": "Distance", "body_a": 0, "body_b": 1,
              "local_anchor_a": [0.0, 0.0], "local_anchor_b": [0.0, 0.0], "length": 100.0 }
        ],
        "soft_bodies": [
            { "points": [[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0]], "pressure": 1.0, "stiffness": 0.5 }
        ]
    }"#;

    #[test]
    fn test_build_from_json() {
        let scene = Scene::from_json_str(SCENE).unwrap();
        let (world, handles) = scene.build().unwrap();
        assert_eq!(handles.bodies.len(), 2);
        assert_eq!(handles.joints.len(), 1);
        assert_eq!(handles.soft_bodies.len(), 1);
        assert_eq!(world.max_bodies(), 8);
        assert_eq!(world.body(handles.bodies[0]).unwrap().body_type(), BodyType::Static);
        assert_eq!(
            *world.body(handles.bodies[1]).unwrap().shape(),
            Shape::Circle { radius: 10.0 }
        );
        assert!((world.joint_length(handles.joints[0]).unwrap() - 100.0).abs() < 1e-4);
    }

    #[test]
    fn test_joint_with_unknown_body_is_rejected() {
        let mut scene = Scene::from_json_str(SCENE).unwrap();
        scene.bodies.truncate(1);
        assert!(matches!(scene.build(), Err(PhysicsError::InvalidDefinition(_))));
    }

    #[test]
    fn test_json_round_trip() {
        let scene = Scene::from_json_str(SCENE).unwrap();
        let json = scene.to_json_string().unwrap();
        assert_eq!(Scene::from_json_str(&json).unwrap(), scene);
    }
}
