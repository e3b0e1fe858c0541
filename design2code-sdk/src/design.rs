//! Design tree model
//!
//! Field names follow the design source's JSON so documents deserialize
//! directly. Attributes the pipeline does not interpret are kept in `extra`
//! and written back unchanged.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::CollaboratorError;

/// Axis-aligned box in absolute document coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }
}

/// Layout hints a code generator reads when placing a node
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutHints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout_align: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout_grow: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout_sizing_horizontal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout_sizing_vertical: Option<String>,
}

/// A fill entry; only image fills matter to the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paint {
    #[serde(rename = "type")]
    pub paint_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Paint {
    pub fn image(image_ref: impl Into<String>) -> Self {
        Self {
            paint_type: "IMAGE".to_string(),
            image_ref: Some(image_ref.into()),
            extra: Map::new(),
        }
    }
}

fn default_visible() -> bool {
    true
}

fn is_true(value: &bool) -> bool {
    *value
}

/// One node of a design tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignNode {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub node_type: String,
    #[serde(default = "default_visible", skip_serializing_if = "is_true")]
    pub visible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub absolute_bounding_box: Option<BoundingBox>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fills: Vec<Paint>,
    #[serde(flatten)]
    pub layout: LayoutHints,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<DesignNode>,
    /// Ids of fragments split off this node, in extraction order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fragment_refs: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DesignNode {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            node_type: node_type.into(),
            visible: true,
            absolute_bounding_box: None,
            fills: Vec::new(),
            layout: LayoutHints::default(),
            children: Vec::new(),
            fragment_refs: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_bounds(mut self, x: f64, y: f64, width: f64, height: f64) -> Self {
        self.absolute_bounding_box = Some(BoundingBox::new(x, y, width, height));
        self
    }

    pub fn with_children(mut self, children: Vec<DesignNode>) -> Self {
        self.children = children;
        self
    }

    pub fn with_fill(mut self, paint: Paint) -> Self {
        self.fills.push(paint);
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn width(&self) -> f64 {
        self.absolute_bounding_box.map(|b| b.width).unwrap_or(0.0)
    }

    pub fn height(&self) -> f64 {
        self.absolute_bounding_box.map(|b| b.height).unwrap_or(0.0)
    }

    /// Area of the bounding box, zero when the node has none
    pub fn area(&self) -> f64 {
        self.absolute_bounding_box.map(|b| b.area()).unwrap_or(0.0)
    }

    /// Ids of this node and all descendants, pre-order
    pub fn ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        self.collect_ids(&mut ids);
        ids
    }

    fn collect_ids(&self, ids: &mut Vec<String>) {
        ids.push(self.id.clone());
        for child in &self.children {
            child.collect_ids(ids);
        }
    }

    pub fn find(&self, id: &str) -> Option<&DesignNode> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(id))
    }

    /// Number of nodes in this subtree
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(DesignNode::node_count).sum::<usize>()
    }

    /// First image reference among this node's fills
    pub fn image_ref(&self) -> Option<&str> {
        self.fills
            .iter()
            .find(|paint| paint.paint_type == "IMAGE")
            .and_then(|paint| paint.image_ref.as_deref())
    }
}

/// A parsed link to one node of a design file
///
/// Accepts links of the form
/// `https://www.figma.com/design/<file_key>/<title>?node-id=1-23&...`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesignRef {
    pub file_key: String,
    /// Node id as written in the link (`1-23`)
    pub node_id: String,
    /// Title segment with dashes replaced by underscores
    pub title: String,
}

impl DesignRef {
    pub fn parse(url: &str) -> Result<Self, CollaboratorError> {
        let url = url.trim();
        let (path, query) = url
            .split_once('?')
            .ok_or_else(|| CollaboratorError::InvalidReference(format!("missing query in {}", url)))?;

        let node_id = query
            .split('&')
            .find_map(|pair| pair.strip_prefix("node-id="))
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                CollaboratorError::InvalidReference(format!("missing node-id parameter in {}", url))
            })?
            .to_string();

        let segments: Vec<&str> = path
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();

        let marker = segments
            .iter()
            .position(|s| matches!(*s, "design" | "file" | "proto"));
        let (file_key, title) = match marker {
            Some(idx) if idx + 1 < segments.len() => {
                (segments[idx + 1], segments.get(idx + 2).copied())
            }
            _ if segments.len() >= 3 => (segments[segments.len() - 2], segments.last().copied()),
            _ => {
                return Err(CollaboratorError::InvalidReference(format!(
                    "missing file key in {}",
                    url
                )))
            }
        };

        Ok(Self {
            file_key: file_key.to_string(),
            node_id,
            title: title.unwrap_or(file_key).replace('-', "_"),
        })
    }

    /// Node id in the form the API expects (`1:23`)
    pub fn api_node_id(&self) -> String {
        self.node_id.replace('-', ":")
    }
}
