//! Repository file tree as returned by `GET /api/file/tree/generate`.
//!
//! The tree is a recursive tagged union: a node is either a file or a
//! directory containing further nodes.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Extensions
// ---------------------------------------------------------------------------

/// Language tag the service attaches to each file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CodeExtension {
    Js,
    Jsx,
    Ts,
    Tsx,
    Html,
    Css,
    Scss,
    Md,
    Json,
    Yaml,
    Go,
    Py,
    Java,
    C,
    Cpp,
    Rs,
    Rb,
    Php,
    Sql,
    Txt,
    Unknown,
    /// Any other upper-cased extension.
    Other(String),
}

impl CodeExtension {
    /// Derive the tag from a file name the same way the server does.
    pub fn from_file_name(name: &str) -> Self {
        let ext = name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "js" => Self::Js,
            "jsx" => Self::Jsx,
            "ts" => Self::Ts,
            "tsx" => Self::Tsx,
            "html" | "htm" => Self::Html,
            "css" => Self::Css,
            "scss" => Self::Scss,
            "md" | "mdx" => Self::Md,
            "json" => Self::Json,
            "yaml" | "yml" => Self::Yaml,
            "go" => Self::Go,
            "py" => Self::Py,
            "java" => Self::Java,
            "c" => Self::C,
            "cc" | "cpp" | "cxx" | "hpp" | "hh" | "hxx" => Self::Cpp,
            "rs" => Self::Rs,
            "rb" => Self::Rb,
            "php" => Self::Php,
            "sql" => Self::Sql,
            "txt" => Self::Txt,
            "" => Self::Unknown,
            other => Self::Other(other.to_ascii_uppercase()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Js => "JS",
            Self::Jsx => "JSX",
            Self::Ts => "TS",
            Self::Tsx => "TSX",
            Self::Html => "HTML",
            Self::Css => "CSS",
            Self::Scss => "SCSS",
            Self::Md => "MD",
            Self::Json => "JSON",
            Self::Yaml => "YAML",
            Self::Go => "GO",
            Self::Py => "PY",
            Self::Java => "JAVA",
            Self::C => "C",
            Self::Cpp => "CPP",
            Self::Rs => "RS",
            Self::Rb => "RB",
            Self::Php => "PHP",
            Self::Sql => "SQL",
            Self::Txt => "TXT",
            Self::Unknown => "UNKNOWN",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for CodeExtension {
    fn from(s: String) -> Self {
        match s.as_str() {
            "JS" => Self::Js,
            "JSX" => Self::Jsx,
            "TS" => Self::Ts,
            "TSX" => Self::Tsx,
            "HTML" => Self::Html,
            "CSS" => Self::Css,
            "SCSS" => Self::Scss,
            "MD" => Self::Md,
            "JSON" => Self::Json,
            "YAML" => Self::Yaml,
            "GO" => Self::Go,
            "PY" => Self::Py,
            "JAVA" => Self::Java,
            "C" => Self::C,
            "CPP" => Self::Cpp,
            "RS" => Self::Rs,
            "RB" => Self::Rb,
            "PHP" => Self::Php,
            "SQL" => Self::Sql,
            "TXT" => Self::Txt,
            "UNKNOWN" | "" => Self::Unknown,
            _ => Self::Other(s),
        }
    }
}

impl From<CodeExtension> for String {
    fn from(ext: CodeExtension) -> Self {
        match ext {
            CodeExtension::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for CodeExtension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

/// A file leaf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeFile {
    pub name: String,
    pub full_path: String,
    pub extension: CodeExtension,
    #[serde(default)]
    pub is_conflicted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// A directory with its children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeDirectory {
    pub name: String,
    pub full_path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_directories: Vec<TreeNode>,
}

/// One entry of the repository tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TreeNode {
    File(CodeFile),
    Directory(CodeDirectory),
}

impl TreeNode {
    pub fn name(&self) -> &str {
        match self {
            Self::File(f) => &f.name,
            Self::Directory(d) => &d.name,
        }
    }

    pub fn full_path(&self) -> &str {
        match self {
            Self::File(f) => &f.full_path,
            Self::Directory(d) => &d.full_path,
        }
    }

    pub fn children(&self) -> &[TreeNode] {
        match self {
            Self::File(_) => &[],
            Self::Directory(d) => &d.sub_directories,
        }
    }
}

// ---------------------------------------------------------------------------
// Traversal
// ---------------------------------------------------------------------------

/// Depth-first pre-order iterator over every node, paired with its depth.
pub struct Walk<'a> {
    stack: Vec<(usize, &'a TreeNode)>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = (usize, &'a TreeNode);

    fn next(&mut self) -> Option<Self::Item> {
        let (depth, node) = self.stack.pop()?;
        self.stack
            .extend(node.children().iter().rev().map(|child| (depth + 1, child)));
        Some((depth, node))
    }
}

/// Walk a forest of root nodes in display order.
pub fn walk(nodes: &[TreeNode]) -> Walk<'_> {
    Walk {
        stack: nodes.iter().rev().map(|n| (0, n)).collect(),
    }
}

/// All files in the tree, in display order.
pub fn files(nodes: &[TreeNode]) -> impl Iterator<Item = &CodeFile> {
    walk(nodes).filter_map(|(_, node)| match node {
        TreeNode::File(f) => Some(f),
        TreeNode::Directory(_) => None,
    })
}

/// Files flagged as conflicted, in display order.
pub fn conflicted_files(nodes: &[TreeNode]) -> Vec<&CodeFile> {
    files(nodes).filter(|f| f.is_conflicted).collect()
}

/// Number of conflicted files anywhere in the tree.
pub fn conflict_count(nodes: &[TreeNode]) -> usize {
    files(nodes).filter(|f| f.is_conflicted).count()
}

/// Total number of files.
pub fn file_count(nodes: &[TreeNode]) -> usize {
    files(nodes).count()
}

/// Locate a file by its full path.
pub fn find_file<'a>(nodes: &'a [TreeNode], full_path: &str) -> Option<&'a CodeFile> {
    let wanted = full_path.trim_start_matches('/');
    files(nodes).find(|f| f.full_path == wanted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<TreeNode> {
        serde_json::from_value(serde_json::json!([
            {
                "type": "FILE",
                "name": "main.go",
                "fullPath": "main.go",
                "extension": "GO",
                "isConflicted": false
            },
            {
                "type": "DIRECTORY",
                "name": "web",
                "fullPath": "web",
                "subDirectories": [
                    {
                        "type": "FILE",
                        "name": "app.tsx",
                        "fullPath": "web/app.tsx",
                        "extension": "TSX",
                        "isConflicted": true
                    },
                    {
                        "type": "FILE",
                        "name": "style.css",
                        "fullPath": "web/style.css",
                        "extension": "CSS",
                        "isConflicted": false
                    },
                    { "type": "DIRECTORY", "name": "empty", "fullPath": "web/empty" }
                ]
            }
        ]))
        .unwrap()
    }

    #[test]
    fn test_one_conflicted_file_in_directory() {
        let tree: Vec<TreeNode> = serde_json::from_value(serde_json::json!([
            {
                "type": "DIRECTORY",
                "name": "hello",
                "fullPath": "hello",
                "subDirectories": [
                    { "type": "FILE", "name": "a.js", "fullPath": "hello/a.js",
                      "extension": "JS", "isConflicted": true },
                    { "type": "FILE", "name": "b.js", "fullPath": "hello/b.js",
                      "extension": "JS", "isConflicted": false }
                ]
            }
        ]))
        .unwrap();
        assert_eq!(conflict_count(&tree), 1);
        assert_eq!(file_count(&tree), 2);
    }

    #[test]
    fn test_walk_is_preorder_with_depth() {
        let tree = sample();
        let visited: Vec<(usize, &str)> = walk(&tree)
            .map(|(depth, node)| (depth, node.full_path()))
            .collect();
        assert_eq!(
            visited,
            vec![
                (0, "main.go"),
                (0, "web"),
                (1, "web/app.tsx"),
                (1, "web/style.css"),
                (1, "web/empty"),
            ]
        );
    }

    #[test]
    fn test_missing_sub_directories_is_empty() {
        let tree = sample();
        let empty = walk(&tree)
            .find(|(_, n)| n.full_path() == "web/empty")
            .map(|(_, n)| n)
            .unwrap();
        assert!(empty.children().is_empty());
    }

    #[test]
    fn test_find_and_conflicted_files() {
        let tree = sample();
        let conflicted = conflicted_files(&tree);
        assert_eq!(conflicted.len(), 1);
        assert_eq!(conflicted[0].extension, CodeExtension::Tsx);

        assert!(find_file(&tree, "/web/style.css").is_some());
        assert!(find_file(&tree, "web").is_none());
    }

    #[test]
    fn test_unknown_extension_survives_round_trip() {
        let node: TreeNode = serde_json::from_value(serde_json::json!({
            "type": "FILE", "name": "build.zig", "fullPath": "build.zig",
            "extension": "ZIG", "isConflicted": false
        }))
        .unwrap();
        let TreeNode::File(ref file) = node else {
            panic!("expected a file node");
        };
        assert_eq!(file.extension, CodeExtension::Other("ZIG".into()));
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["extension"], "ZIG");
        assert_eq!(json["type"], "FILE");
        assert!(json.get("code").is_none());
    }

    #[test]
    fn test_extension_from_file_name() {
        assert_eq!(CodeExtension::from_file_name("index.htm"), CodeExtension::Html);
        assert_eq!(CodeExtension::from_file_name("ci.YML"), CodeExtension::Yaml);
        assert_eq!(CodeExtension::from_file_name("vec.hpp"), CodeExtension::Cpp);
        assert_eq!(CodeExtension::from_file_name("Makefile"), CodeExtension::Unknown);
        assert_eq!(
            CodeExtension::from_file_name("build.zig"),
            CodeExtension::Other("ZIG".into())
        );
    }
}
