use crate::parser::SourceKind;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use tree_sitter::{Node, Tree};

/// Deepest named-node nesting a tree may have and still be serialized
pub const MAX_TREE_DEPTH: usize = 256;

/// A successfully parsed source file, serializable as a JSON syntax tree
pub struct SyntaxTree {
    tree: Tree,
    source: String,
    kind: SourceKind,
}

impl SyntaxTree {
    pub(crate) fn new(tree: Tree, source: String, kind: SourceKind) -> Self {
        Self { tree, source, kind }
    }

    /// Source kind the file parsed under
    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    /// Number of named nodes in the tree
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        let mut cursor = self.tree.walk();
        loop {
            if cursor.node().is_named() {
                count += 1;
            }
            if cursor.goto_first_child() {
                continue;
            }
            loop {
                if cursor.goto_next_sibling() {
                    break;
                }
                if !cursor.goto_parent() {
                    return count;
                }
            }
        }
    }
}

impl SyntaxTree {
    /// Deepest chain of named nodes, counted without recursion.
    ///
    /// Serialization recurses once per named level, so callers compare this
    /// against [`MAX_TREE_DEPTH`] before serializing.
    pub fn depth(&self) -> usize {
        let mut cursor = self.tree.walk();
        let mut path = vec![cursor.node().is_named()];
        let mut named = usize::from(path[0]);
        let mut deepest = named;
        loop {
            if cursor.goto_first_child() {
                let is_named = cursor.node().is_named();
                named += usize::from(is_named);
                deepest = deepest.max(named);
                path.push(is_named);
                continue;
            }
            loop {
                if path.pop() == Some(true) {
                    named -= 1;
                }
                if cursor.goto_next_sibling() {
                    let is_named = cursor.node().is_named();
                    named += usize::from(is_named);
                    deepest = deepest.max(named);
                    path.push(is_named);
                    break;
                }
                if !cursor.goto_parent() {
                    return deepest;
                }
            }
        }
    }
}

impl std::fmt::Debug for SyntaxTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyntaxTree")
            .field("kind", &self.kind)
            .field("bytes", &self.source.len())
            .finish()
    }
}

impl Serialize for SyntaxTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("type", "File")?;
        map.serialize_entry("sourceType", &self.kind)?;
        map.serialize_entry(
            "program",
            &NodeView {
                node: self.tree.root_node(),
                field: None,
                source: self.source.as_bytes(),
            },
        )?;
        map.end()
    }
}

#[derive(Serialize)]
struct Position {
    line: usize,
    column: usize,
}

#[derive(Serialize)]
struct Location {
    start: Position,
    end: Position,
}

impl Location {
    fn of(node: Node<'_>) -> Self {
        let start = node.start_position();
        let end = node.end_position();
        Self {
            start: Position {
                line: start.row + 1,
                column: start.column,
            },
            end: Position {
                line: end.row + 1,
                column: end.column,
            },
        }
    }
}

/// Borrowed view of a named node; leaves carry their source text
struct NodeView<'t> {
    node: Node<'t>,
    field: Option<&'static str>,
    source: &'t [u8],
}

impl<'t> NodeView<'t> {
    fn named_children(&self) -> Vec<NodeView<'t>> {
        let mut children = Vec::new();
        let mut cursor = self.node.walk();
        if cursor.goto_first_child() {
            loop {
                let child = cursor.node();
                if child.is_named() {
                    children.push(NodeView {
                        node: child,
                        field: cursor.field_name(),
                        source: self.source,
                    });
                }
                if !cursor.goto_next_sibling() {
                    break;
                }
            }
        }
        children
    }
}

impl Serialize for NodeView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let children = self.named_children();
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("type", self.node.kind())?;
        if let Some(field) = self.field {
            map.serialize_entry("field", field)?;
        }
        map.serialize_entry("start", &self.node.start_byte())?;
        map.serialize_entry("end", &self.node.end_byte())?;
        map.serialize_entry("loc", &Location::of(self.node))?;
        if children.is_empty() {
            if let Ok(text) = self.node.utf8_text(self.source) {
                map.serialize_entry("text", text)?;
            }
        } else {
            map.serialize_entry("children", &children)?;
        }
        map.end()
    }
}
