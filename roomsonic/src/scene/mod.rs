//! Scene-graph integration.
//!
//! The engine does not own the host's scene. It only needs two things from it:
//! a world matrix per node, and a notification whenever that matrix is recomputed.
//! [`SceneGraph`] is a small hierarchy providing both, and [`SceneBinding`] ties one
//! of its nodes to an emitter or to the listener.
//!
//! # Example
//!
//! ```
//! use roomsonic::scene::SceneGraph;
//! use roomsonic::{RoomSonicDesc, RoomSonicEngine};
//! use roomsonic::math::Vec3;
//!
//! let mut engine = RoomSonicEngine::with_fallback_hrtf(RoomSonicDesc::default())?;
//! let mut graph = SceneGraph::new();
//!
//! let camera = graph.add_node("camera");
//! let speaker = graph.add_node("speaker");
//! let emitter = engine.create_emitter()?;
//!
//! engine.attach_listener(&mut graph, camera)?;
//! engine.attach_emitter(&mut graph, speaker, emitter)?;
//!
//! graph.set_position(speaker, Vec3::new(0.0, 0.0, 2.0))?;
//! engine.update(&mut graph);
//! assert_eq!(engine.emitter(emitter).unwrap().transform().position, Vec3::new(0.0, 0.0, 2.0));
//! # Ok::<(), roomsonic::RoomSonicError>(())
//! ```

mod binding;
mod graph;

pub use binding::{BindingState, BindingTarget, SceneBinding, SceneBindings};
pub use graph::{NodeId, SceneGraph, SceneNode, Transform, WorldMatrixHook};
