//! Boosted Haar cascade model, read from OpenCV classifier XML.
//!
//! Supports the `<opencv_storage><cascade>` layout written by
//! `opencv_traincascade` with `stageType` BOOST and `featureType` HAAR,
//! which is what the stock `haarcascade_*.xml` files use.

use crate::integral::IntegralImage;
use roxmltree::Node;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Subtracted from every stage threshold on load, as the reference loader does.
const STAGE_THRESHOLD_EPS: f32 = 1e-5;
/// Maximum rectangles per Haar feature.
const MAX_FEATURE_RECTS: usize = 3;
/// Values per internal node for non-categorical features: left, right, feature, threshold.
const NODE_FIELDS: usize = 4;
/// Values per feature rectangle: x, y, width, height, weight.
const RECT_FIELDS: usize = 5;

#[derive(Error, Debug)]
pub enum CascadeError {
    #[error("classifier file not found: {0}")]
    NotFound(String),
    #[error("failed to read classifier {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed classifier XML: {0}")]
    Xml(#[from] roxmltree::Error),
    #[error("invalid cascade: {0}")]
    Format(String),
    #[error("unsupported cascade: {0}")]
    Unsupported(String),
}

/// A loaded cascade: base window size, ordered stages and the feature table.
#[derive(Debug, Clone)]
pub struct Cascade {
    pub window_width: usize,
    pub window_height: usize,
    pub stages: Vec<Stage>,
    pub features: Vec<HaarFeature>,
}

#[derive(Debug, Clone)]
pub struct Stage {
    pub threshold: f32,
    pub classifiers: Vec<WeakClassifier>,
}

/// Decision tree over feature responses.
///
/// Node children `> 0` index another node; `<= 0` select leaf `-child`.
#[derive(Debug, Clone)]
pub struct WeakClassifier {
    pub nodes: Vec<TreeNode>,
    pub leaves: Vec<f32>,
}

#[derive(Debug, Clone, Copy)]
pub struct TreeNode {
    pub left: i32,
    pub right: i32,
    pub feature: usize,
    pub threshold: f32,
}

/// Up to three weighted rectangles, relative to the window origin.
#[derive(Debug, Clone)]
pub struct HaarFeature {
    pub rects: Vec<WeightedRect>,
}

#[derive(Debug, Clone, Copy)]
pub struct WeightedRect {
    pub x: usize,
    pub y: usize,
    pub w: usize,
    pub h: usize,
    pub weight: f32,
}

/// Outcome of running the stages over one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    Rejected { stage: usize },
}

impl HaarFeature {
    /// Raw (un-normalised) response for the window at `(x, y)`.
    #[inline]
    pub fn response(&self, ii: &IntegralImage, x: usize, y: usize) -> f32 {
        self.rects
            .iter()
            .map(|r| r.weight * ii.rect_sum(x + r.x, y + r.y, r.w, r.h) as f32)
            .sum()
    }
}

impl WeakClassifier {
    /// Walk the tree and return the selected leaf value.
    #[inline]
    pub fn predict(&self, feature_value: &impl Fn(usize) -> f32) -> f32 {
        let mut idx = 0i32;
        loop {
            let node = &self.nodes[idx as usize];
            idx = if feature_value(node.feature) < node.threshold {
                node.left
            } else {
                node.right
            };
            if idx <= 0 {
                return self.leaves[(-idx) as usize];
            }
        }
    }
}

impl Cascade {
    /// Load a classifier file from disk.
    pub fn load(path: &Path) -> Result<Self, CascadeError> {
        if !path.exists() {
            return Err(CascadeError::NotFound(path.display().to_string()));
        }
        let xml = std::fs::read_to_string(path).map_err(|source| CascadeError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let cascade = Self::parse(&xml)?;
        tracing::info!(
            path = %path.display(),
            window = ?(cascade.window_width, cascade.window_height),
            stages = cascade.stages.len(),
            features = cascade.features.len(),
            "loaded cascade classifier"
        );
        Ok(cascade)
    }

    /// Parse and validate classifier XML.
    pub fn parse(xml: &str) -> Result<Self, CascadeError> {
        let doc = roxmltree::Document::parse(xml)?;
        let root = doc.root_element();
        let cascade = child(root, "cascade").ok_or_else(|| {
            CascadeError::Unsupported(format!(
                "expected <cascade> under <{}>; legacy classifier layouts are not supported",
                root.tag_name().name()
            ))
        })?;

        let stage_type = text(require(cascade, "stageType")?);
        if stage_type != "BOOST" {
            return Err(CascadeError::Unsupported(format!("stage type {stage_type}")));
        }
        let feature_type = text(require(cascade, "featureType")?);
        if feature_type != "HAAR" {
            return Err(CascadeError::Unsupported(format!("feature type {feature_type}")));
        }
        if let Some(params) = child(cascade, "featureParams") {
            if let Some(cat) = child(params, "maxCatCount") {
                let cat: usize = scalar(cat, "maxCatCount")?;
                if cat > 0 {
                    return Err(CascadeError::Unsupported("categorical features".into()));
                }
            }
        }

        let window_width: usize = scalar(require(cascade, "width")?, "width")?;
        let window_height: usize = scalar(require(cascade, "height")?, "height")?;
        if window_width < 3 || window_height < 3 {
            return Err(CascadeError::Format(format!(
                "window {window_width}x{window_height} is too small"
            )));
        }

        let features = items(require(cascade, "features")?)
            .enumerate()
            .map(|(i, node)| parse_feature(node, i, window_width, window_height))
            .collect::<Result<Vec<_>, _>>()?;

        let stages = items(require(cascade, "stages")?)
            .enumerate()
            .map(|(i, node)| parse_stage(node, i, features.len()))
            .collect::<Result<Vec<_>, _>>()?;

        if stages.is_empty() {
            return Err(CascadeError::Format("cascade has no stages".into()));
        }
        if let Some(n) = child(cascade, "stageNum") {
            let declared: usize = scalar(n, "stageNum")?;
            if declared != stages.len() {
                return Err(CascadeError::Format(format!(
                    "stageNum is {declared} but {} stages are present",
                    stages.len()
                )));
            }
        }

        Ok(Self {
            window_width,
            window_height,
            stages,
            features,
        })
    }

    /// Run every stage on one window; stops at the first rejecting stage.
    pub fn classify(&self, feature_value: impl Fn(usize) -> f32) -> Verdict {
        for (i, stage) in self.stages.iter().enumerate() {
            let sum: f32 = stage
                .classifiers
                .iter()
                .map(|wc| wc.predict(&feature_value))
                .sum();
            if sum < stage.threshold {
                return Verdict::Rejected { stage: i };
            }
        }
        Verdict::Accepted
    }
}

fn parse_stage(node: Node, index: usize, num_features: usize) -> Result<Stage, CascadeError> {
    let threshold: f32 = scalar(require(node, "stageThreshold")?, "stageThreshold")?;

    let classifiers = items(require(node, "weakClassifiers")?)
        .map(|wc| parse_weak_classifier(wc, num_features))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| match e {
            CascadeError::Format(msg) => CascadeError::Format(format!("stage {index}: {msg}")),
            other => other,
        })?;

    if classifiers.is_empty() {
        return Err(CascadeError::Format(format!("stage {index} has no weak classifiers")));
    }

    Ok(Stage {
        threshold: threshold - STAGE_THRESHOLD_EPS,
        classifiers,
    })
}

fn parse_weak_classifier(node: Node, num_features: usize) -> Result<WeakClassifier, CascadeError> {
    let raw: Vec<&str> = text(require(node, "internalNodes")?)
        .split_whitespace()
        .collect();
    if raw.is_empty() || raw.len() % NODE_FIELDS != 0 {
        return Err(CascadeError::Format(format!(
            "internalNodes has {} values, expected a multiple of {NODE_FIELDS}",
            raw.len()
        )));
    }

    let nodes = raw
        .chunks_exact(NODE_FIELDS)
        .map(|f| {
            Ok(TreeNode {
                left: token(f[0], "node left")?,
                right: token(f[1], "node right")?,
                feature: token(f[2], "node feature")?,
                threshold: token(f[3], "node threshold")?,
            })
        })
        .collect::<Result<Vec<_>, CascadeError>>()?;

    let leaves: Vec<f32> = numbers(require(node, "leafValues")?, "leafValues")?;
    if leaves.len() != nodes.len() + 1 {
        return Err(CascadeError::Format(format!(
            "{} internal nodes need {} leaves, found {}",
            nodes.len(),
            nodes.len() + 1,
            leaves.len()
        )));
    }

    for (i, n) in nodes.iter().enumerate() {
        if n.feature >= num_features {
            return Err(CascadeError::Format(format!(
                "feature index {} out of range ({num_features} features)",
                n.feature
            )));
        }
        for next in [n.left, n.right] {
            let valid = if next > 0 {
                // Children must point forward so evaluation always terminates.
                (next as usize) > i && (next as usize) < nodes.len()
            } else {
                (next.unsigned_abs() as usize) < leaves.len()
            };
            if !valid {
                return Err(CascadeError::Format(format!("node {i} has invalid child {next}")));
            }
        }
    }

    Ok(WeakClassifier { nodes, leaves })
}

fn parse_feature(
    node: Node,
    index: usize,
    window_width: usize,
    window_height: usize,
) -> Result<HaarFeature, CascadeError> {
    if let Some(t) = child(node, "tilted") {
        if text(t) != "0" {
            return Err(CascadeError::Unsupported(format!(
                "feature {index} is tilted (45° features are not supported)"
            )));
        }
    }

    let rects = items(require(node, "rects")?)
        .map(|r| {
            let raw: Vec<&str> = text(r).split_whitespace().collect();
            if raw.len() != RECT_FIELDS {
                return Err(CascadeError::Format(format!(
                    "feature {index}: rect has {} values, expected {RECT_FIELDS}",
                    raw.len()
                )));
            }
            let rect = WeightedRect {
                x: token(raw[0], "rect x")?,
                y: token(raw[1], "rect y")?,
                w: token(raw[2], "rect width")?,
                h: token(raw[3], "rect height")?,
                weight: token(raw[4], "rect weight")?,
            };
            if rect.x + rect.w > window_width || rect.y + rect.h > window_height {
                return Err(CascadeError::Format(format!(
                    "feature {index}: rect {},{} {}x{} exceeds the {window_width}x{window_height} window",
                    rect.x, rect.y, rect.w, rect.h
                )));
            }
            Ok(rect)
        })
        .collect::<Result<Vec<_>, _>>()?;

    if rects.is_empty() || rects.len() > MAX_FEATURE_RECTS {
        return Err(CascadeError::Format(format!(
            "feature {index} has {} rects, expected 1 to {MAX_FEATURE_RECTS}",
            rects.len()
        )));
    }

    Ok(HaarFeature { rects })
}

fn child<'a, 'i>(node: Node<'a, 'i>, name: &str) -> Option<Node<'a, 'i>> {
    node.children().find(|n| n.has_tag_name(name))
}

fn require<'a, 'i>(node: Node<'a, 'i>, name: &str) -> Result<Node<'a, 'i>, CascadeError> {
    child(node, name).ok_or_else(|| {
        CascadeError::Format(format!("<{}> is missing <{name}>", node.tag_name().name()))
    })
}

/// Element children; sequences in OpenCV storage are `<_>` items.
fn items<'a, 'i>(node: Node<'a, 'i>) -> impl Iterator<Item = Node<'a, 'i>> {
    node.children().filter(|n| n.is_element())
}

fn text<'a>(node: Node<'a, '_>) -> &'a str {
    node.text().unwrap_or("").trim()
}

fn token<T: FromStr>(raw: &str, what: &str) -> Result<T, CascadeError> {
    raw.parse()
        .map_err(|_| CascadeError::Format(format!("{what}: cannot parse {raw:?}")))
}

fn scalar<T: FromStr>(node: Node, what: &str) -> Result<T, CascadeError> {
    token(text(node), what)
}

fn numbers<T: FromStr>(node: Node, what: &str) -> Result<Vec<T>, CascadeError> {
    text(node).split_whitespace().map(|t| token(t, what)).collect()
}

/// Single-stage cascade over a 24×24 window that fires on a dark-above-bright
/// horizontal edge: feature 0 is `bottom half − top half`.
#[cfg(test)]
pub(crate) const EDGE_CASCADE_XML: &str = r#"<?xml version="1.0"?>
<opencv_storage>
<cascade type_id="opencv-cascade-classifier"><stageType>BOOST</stageType>
  <featureType>HAAR</featureType>
  <height>24</height>
  <width>24</width>
  <stageParams>
    <maxWeakCount>1</maxWeakCount></stageParams>
  <featureParams>
    <maxCatCount>0</maxCatCount></featureParams>
  <stageNum>1</stageNum>
  <stages>
    <_>
      <maxWeakCount>1</maxWeakCount>
      <stageThreshold>0.</stageThreshold>
      <weakClassifiers>
        <_>
          <internalNodes>
            0 -1 0 5.0000000000000000e-01</internalNodes>
          <leafValues>
            -1. 1.</leafValues></_></weakClassifiers></_></stages>
  <features>
    <_>
      <rects>
        <_>
          0 0 24 12 -1.</_>
        <_>
          0 12 24 12 1.</_></rects></_></features></cascade>
</opencv_storage>
"#;
