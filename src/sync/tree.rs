//! Hierarchical text view of the model.
//!
//! Files are split on `/` into directory nodes that are created once per
//! path prefix and reused by later files; each file's functions hang below
//! it as `name()` leaves.

use std::collections::HashMap;

use crate::model::{Function, SourceFile};

#[derive(Debug)]
struct Node {
    label: String,
    children: Vec<usize>,
}

/// Arena of labelled nodes; index 0 is the root.
#[derive(Debug)]
pub struct Tree {
    nodes: Vec<Node>,
    directories: HashMap<(usize, String), usize>,
}

impl Tree {
    /// Empty tree whose root reads `{root_name}/`.
    #[must_use]
    pub fn new(root_name: &str) -> Self {
        Self {
            nodes: vec![Node {
                label: format!("{root_name}/"),
                children: Vec::new(),
            }],
            directories: HashMap::new(),
        }
    }

    fn push(&mut self, parent: usize, label: String) -> usize {
        let id = self.nodes.len();
        self.nodes.push(Node {
            label,
            children: Vec::new(),
        });
        self.nodes[parent].children.push(id);
        id
    }

    /// The directory node `segment/` below `parent`, created on first use.
    fn directory(&mut self, parent: usize, segment: &str) -> usize {
        if let Some(&id) = self.directories.get(&(parent, segment.to_string())) {
            return id;
        }
        let id = self.push(parent, format!("{segment}/"));
        self.directories.insert((parent, segment.to_string()), id);
        id
    }

    /// Add a file at its `/`-separated path with its functions below it.
    pub fn add_file(&mut self, path: &str, functions: &[Function]) {
        let mut segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let Some(leaf) = segments.pop() else {
            return;
        };

        let parent = segments
            .into_iter()
            .fold(0, |parent, segment| self.directory(parent, segment));
        let file = self.push(parent, leaf.to_string());
        for function in functions {
            self.push(file, format!("{}()", function.name));
        }
    }

    /// Draw with box guides, one node per line, no trailing newline.
    #[must_use]
    pub fn render(&self) -> String {
        let mut lines = vec![self.nodes[0].label.clone()];
        self.render_children(0, "", &mut lines);
        lines.join("\n")
    }

    fn render_children(&self, id: usize, prefix: &str, lines: &mut Vec<String>) {
        let children = &self.nodes[id].children;
        for (i, &child) in children.iter().enumerate() {
            let last = i + 1 == children.len();
            let (branch, indent) = if last {
                ("└── ", "    ")
            } else {
                ("├── ", "│   ")
            };
            lines.push(format!("{prefix}{branch}{}", self.nodes[child].label));
            self.render_children(child, &format!("{prefix}{indent}"), lines);
        }
    }
}

/// Build the tree text for a project from its files (any order) and their
/// functions in declaration order.
#[must_use]
pub fn build_tree(project_name: &str, files: &[(SourceFile, Vec<Function>)]) -> String {
    let mut sorted: Vec<&(SourceFile, Vec<Function>)> = files.iter().collect();
    sorted.sort_by(|a, b| a.0.filename.cmp(&b.0.filename));

    let mut tree = Tree::new(project_name);
    for (file, functions) in sorted {
        tree.add_file(&file.filename, functions);
    }
    tree.render()
}
