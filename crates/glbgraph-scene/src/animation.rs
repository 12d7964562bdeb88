//! Animation tracks.
//!
//! Each schema animation becomes one [`AnimTrack`]. Sampler inputs and outputs
//! are materialized once per accessor, morph weight channels are split into
//! one curve per target, and rotation outputs are made sign-continuous.

use std::collections::BTreeMap;

use glbgraph_core::schema;
use glbgraph_core::{GraphError, Result};
use tracing::debug;

use crate::builder::GraphBuilder;
use crate::node::NodeId;
use crate::warning::Warning;

/// Component that owns every animated property.
pub const GRAPH_COMPONENT: &str = "graph";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interpolation {
    Step,
    #[default]
    Linear,
    CubicSpline,
}

impl Interpolation {
    /// Maps a sampler tag; unknown or missing tags are linear.
    pub fn from_name(name: Option<&str>) -> Self {
        match name {
            Some("STEP") => Interpolation::Step,
            Some("CUBICSPLINE") => Interpolation::CubicSpline,
            _ => Interpolation::Linear,
        }
    }
}

/// Keyframe values with a fixed number of components per key.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnimData {
    pub components: usize,
    pub data: Vec<f32>,
}

impl AnimData {
    pub fn new(components: usize, data: Vec<f32>) -> Self {
        Self { components, data }
    }

    pub fn last(&self) -> Option<f32> {
        self.data.last().copied()
    }
}

/// Target of a curve: an entity path plus a property on it.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimBinding {
    /// Node names from the root down to the target.
    pub entity_path: Vec<String>,
    pub component: String,
    pub property: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnimCurve {
    pub paths: Vec<AnimBinding>,
    /// Index into [`AnimTrack::inputs`].
    pub input: usize,
    /// Index into [`AnimTrack::outputs`].
    pub output: usize,
    pub interpolation: Interpolation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnimTrack {
    pub name: String,
    pub duration: f32,
    pub inputs: Vec<AnimData>,
    pub outputs: Vec<AnimData>,
    pub curves: Vec<AnimCurve>,
}

/// Maps a channel path to the animated node property.
pub fn transform_property(path: &str) -> Option<&'static str> {
    match path {
        "translation" => Some("localPosition"),
        "rotation" => Some("localRotation"),
        "scale" => Some("localScale"),
        _ => None,
    }
}

/// Splits interleaved morph weights into one single-component output per
/// target.
///
/// With `K` input keys the target count is `len / K`; output `j` holds
/// `data[k * targets + j]` for each key `k`.
pub fn split_morph_weights(output: &AnimData, input_len: usize) -> Vec<AnimData> {
    if input_len == 0 {
        return Vec::new();
    }
    let targets = output.data.len() / input_len;
    if targets == 0 {
        return Vec::new();
    }
    let keyframes = output.data.len() / targets;
    (0..targets)
        .map(|j| {
            let data = (0..keyframes)
                .map(|k| output.data[k * targets + j])
                .collect();
            AnimData::new(1, data)
        })
        .collect()
}

/// Negates quaternion keys so consecutive keys have a non-negative dot
/// product.
pub fn repair_quaternion_continuity(data: &mut [f32]) {
    let keys = data.len() / 4;
    for k in 1..keys {
        let (previous, current) = data.split_at_mut(k * 4);
        let previous = &previous[(k - 1) * 4..];
        let current = &mut current[..4];
        let dot: f32 = previous.iter().zip(current.iter()).map(|(a, b)| a * b).sum();
        if dot < 0.0 {
            current.iter_mut().for_each(|v| *v = -*v);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum OutputRef {
    Accessor(usize),
    Split(usize),
}

#[derive(Debug, Clone)]
struct PendingCurve {
    paths: Vec<AnimBinding>,
    input: usize,
    output: OutputRef,
    interpolation: Interpolation,
    morph: bool,
}

impl<'a> GraphBuilder<'a> {
    /// Builds every schema animation; run after the node hierarchy exists.
    pub fn build_animations(&mut self) -> Result<()> {
        if self.options.skip_animations {
            return Ok(());
        }
        let document = self.document;
        let mut tracks = Vec::with_capacity(document.animations.len());
        for (index, animation) in document.animations.iter().enumerate() {
            tracks.push(self.build_animation(animation, index)?);
        }
        debug!(animations = tracks.len(), "built animations");
        self.graph.animations = tracks;
        Ok(())
    }

    fn anim_data(&self, accessor: usize) -> Result<AnimData> {
        let components = self.accessor(accessor)?.element_type.components();
        Ok(AnimData::new(components, self.extract_f32(accessor)?))
    }

    /// Builds the track of one schema animation.
    pub fn build_animation(
        &mut self,
        animation: &schema::Animation,
        index: usize,
    ) -> Result<AnimTrack> {
        let document = self.document;
        let mut inputs: BTreeMap<usize, AnimData> = BTreeMap::new();
        let mut outputs: BTreeMap<usize, AnimData> = BTreeMap::new();
        let mut curves = Vec::with_capacity(animation.samplers.len());

        for sampler in &animation.samplers {
            if !inputs.contains_key(&sampler.input) {
                inputs.insert(sampler.input, self.anim_data(sampler.input)?);
            }
            if !outputs.contains_key(&sampler.output) {
                outputs.insert(sampler.output, self.anim_data(sampler.output)?);
            }
            curves.push(PendingCurve {
                paths: Vec::new(),
                input: sampler.input,
                output: OutputRef::Accessor(sampler.output),
                interpolation: Interpolation::from_name(sampler.interpolation.as_deref()),
                morph: false,
            });
        }

        let mut split_outputs = Vec::new();
        let mut split_curves = Vec::new();
        for (channel_index, channel) in animation.channels.iter().enumerate() {
            let Some(node) = channel.target.node else {
                continue;
            };
            let Some(target) = document.nodes.get(node) else {
                return Err(GraphError::format(format!(
                    "Animation {} targets missing node {}",
                    index, node
                )));
            };
            let entity_path = self.graph.nodes.path(NodeId(node));
            let curve = curves.get_mut(channel.sampler).ok_or_else(|| {
                GraphError::format(format!(
                    "Animation {} channel {} uses missing sampler {}",
                    index, channel_index, channel.sampler
                ))
            })?;

            if channel.target.path.starts_with("weights") {
                curve.morph = true;
                let input_len = inputs.get(&curve.input).map_or(0, |d| d.data.len());
                let splits = match curve.output {
                    OutputRef::Accessor(output) => outputs
                        .get(&output)
                        .map(|out| split_morph_weights(out, input_len))
                        .unwrap_or_default(),
                    OutputRef::Split(_) => Vec::new(),
                };
                if splits.is_empty() {
                    self.warn(Warning::MissingMorphOutput {
                        animation: index,
                        channel: channel_index,
                    });
                    continue;
                }

                let target_names = target
                    .mesh
                    .and_then(|mesh| document.meshes.get(mesh))
                    .and_then(|mesh| mesh.target_names());
                for (j, data) in splits.into_iter().enumerate() {
                    let weight = match target_names.as_ref().and_then(|names| names.get(j)) {
                        Some(name) if !name.is_empty() => format!("weight.name.{}", name),
                        _ => format!("weight.{}", j),
                    };
                    split_outputs.push(data);
                    split_curves.push(PendingCurve {
                        paths: vec![AnimBinding {
                            entity_path: entity_path.clone(),
                            component: GRAPH_COMPONENT.to_string(),
                            property: weight,
                        }],
                        input: curve.input,
                        output: OutputRef::Split(split_outputs.len() - 1),
                        interpolation: curve.interpolation,
                        morph: false,
                    });
                }
            } else if let Some(property) = transform_property(&channel.target.path) {
                curve.paths.push(AnimBinding {
                    entity_path,
                    component: GRAPH_COMPONENT.to_string(),
                    property: property.to_string(),
                });
            }
        }

        let input_slots: BTreeMap<usize, usize> = inputs
            .keys()
            .enumerate()
            .map(|(slot, &accessor)| (accessor, slot))
            .collect();
        let accessor_outputs = outputs.len();
        let output_slots: BTreeMap<usize, usize> = outputs
            .keys()
            .enumerate()
            .map(|(slot, &accessor)| (accessor, slot))
            .collect();
        let inputs: Vec<AnimData> = inputs.into_values().collect();
        let mut outputs: Vec<AnimData> = outputs.into_values().chain(split_outputs).collect();

        let resolved: Vec<AnimCurve> = curves
            .into_iter()
            .filter(|curve| !curve.morph)
            .chain(split_curves)
            .map(|curve| AnimCurve {
                paths: curve.paths,
                input: input_slots[&curve.input],
                output: match curve.output {
                    OutputRef::Accessor(accessor) => output_slots[&accessor],
                    OutputRef::Split(split) => accessor_outputs + split,
                },
                interpolation: curve.interpolation,
            })
            .collect();

        let mut rotations: Vec<usize> = resolved
            .iter()
            .filter(|curve| {
                curve.interpolation != Interpolation::CubicSpline
                    && curve
                        .paths
                        .first()
                        .is_some_and(|binding| binding.property == "localRotation")
            })
            .map(|curve| curve.output)
            .collect();
        rotations.sort_unstable();
        rotations.dedup();
        for output in rotations {
            let data = &mut outputs[output];
            if data.components == 4 {
                repair_quaternion_continuity(&mut data.data);
            }
        }

        let duration = inputs
            .iter()
            .map(|input| input.last().unwrap_or(0.0))
            .fold(0.0f32, f32::max);
        let name = animation
            .name
            .clone()
            .unwrap_or_else(|| format!("animation_{}", index));

        Ok(AnimTrack {
            name,
            duration,
            inputs,
            outputs,
            curves: resolved,
        })
    }
}
