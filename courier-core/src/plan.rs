//! Traversal planning.
//!
//! Flattens the collection tree into the ordered sequence of steps one
//! iteration executes. The walk is a pre-order DFS over a closed sum of
//! step kinds: a synthetic folder-enter step carrying the folder's
//! pre-request script before its descendants, the descendants themselves,
//! and a synthetic folder-exit step carrying the folder's test script
//! after them. Planning the same collection with the same options always
//! yields the same sequence.

use crate::{
    collection::{Collection, Folder, Item, Node, Request, Script},
    error::{Error, Result},
    options::Selector,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum StepKind {
    FolderEnter,
    Request,
    FolderExit,
}

/// One schedulable unit of the flattened sequence.
#[derive(Debug, Clone)]
pub struct Step {
    pub kind: StepKind,
    pub name: String,
    pub id: Option<String>,
    /// Names of the enclosing folders, outermost first.
    pub folder_path: Vec<String>,
    /// Present on `Request` steps only; folder steps are script-only.
    pub request: Option<Request>,
    pub prerequest: Option<Script>,
    pub test: Option<Script>,
}

impl Step {
    /// The nearest enclosing folder, used as the failure boundary when
    /// bailing with the folder modifier.
    pub fn enclosing_folder(&self) -> Option<&str> {
        match self.kind {
            StepKind::FolderEnter | StepKind::FolderExit => Some(&self.name),
            StepKind::Request => self.folder_path.last().map(String::as_str),
        }
    }

    fn for_item(item: &Item, folder_path: &[String]) -> Step {
        Step {
            kind: StepKind::Request,
            name: item.name.clone(),
            id: item.id.clone(),
            folder_path: folder_path.to_vec(),
            request: Some(item.request.clone()),
            prerequest: item.prerequest.clone(),
            test: item.test.clone(),
        }
    }

    fn for_folder(folder: &Folder, kind: StepKind, folder_path: &[String]) -> Step {
        Step {
            kind,
            name: folder.name.clone(),
            id: folder.id.clone(),
            folder_path: folder_path.to_vec(),
            request: None,
            prerequest: match kind {
                StepKind::FolderEnter => folder.prerequest.clone(),
                _ => None,
            },
            test: match kind {
                StepKind::FolderExit => folder.test.clone(),
                _ => None,
            },
        }
    }
}

/// Flattens a collection into an ordered step sequence, applying folder
/// scoping.
pub struct Planner<'a> {
    collection: &'a Collection,
    include: &'a Selector,
    exclude: &'a Selector,
}

impl<'a> Planner<'a> {
    pub fn new(
        collection: &'a Collection,
        include: &'a Selector,
        exclude: &'a Selector,
    ) -> Planner<'a> {
        Planner {
            collection,
            include,
            exclude,
        }
    }

    /// Produce the step sequence. With `strict_lookup`, an inclusion
    /// selector that matches nothing is a run-level error; otherwise it
    /// yields an empty plan.
    pub fn plan(&self, strict_lookup: bool) -> Result<Vec<Step>> {
        let mut walk = Walk {
            include: self.include,
            exclude: self.exclude,
            path: Vec::new(),
            steps: Vec::new(),
            matched: false,
        };
        for node in &self.collection.children {
            walk.visit(node, self.include.is_empty());
        }

        if !walk.matched && !self.include.is_empty() && strict_lookup {
            return Err(Error::NotFound(self.include.names().join(", ")));
        }

        Ok(walk.steps)
    }
}

struct Walk<'a> {
    include: &'a Selector,
    exclude: &'a Selector,
    path: Vec<String>,
    steps: Vec<Step>,
    /// Whether the inclusion selector matched at least one node, even one
    /// whose subtree produced no steps. Drives the strict-lookup error.
    matched: bool,
}

impl Walk<'_> {
    fn visit(&mut self, node: &Node, included: bool) {
        // Exclusion prunes the subtree regardless of inclusion and depth.
        if self.exclude.matches(node.name(), node.id()) {
            return;
        }
        let hit = self.include.matches(node.name(), node.id());
        self.matched |= hit;
        let included = included || hit;

        match node {
            Node::Item(item) => {
                if included {
                    self.steps.push(Step::for_item(item, &self.path));
                }
            }
            Node::Folder(folder) => {
                if included && folder.prerequest.is_some() {
                    self.steps
                        .push(Step::for_folder(folder, StepKind::FolderEnter, &self.path));
                }
                self.path.push(folder.name.clone());
                for child in &folder.children {
                    self.visit(child, included);
                }
                self.path.pop();
                if included && folder.test.is_some() {
                    self.steps
                        .push(Step::for_folder(folder, StepKind::FolderExit, &self.path));
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn item(name: &str) -> Node {
        Node::Item(Item {
            name: name.into(),
            request: Request {
                method: "GET".into(),
                url: format!("https://example.test/{name}"),
                ..Default::default()
            },
            ..Default::default()
        })
    }

    fn folder(name: &str, children: Vec<Node>) -> Folder {
        Folder {
            name: name.into(),
            children,
            ..Default::default()
        }
    }

    fn scripted_folder(name: &str, children: Vec<Node>) -> Node {
        Node::Folder(Folder {
            prerequest: Some(Script {
                source: "setup()".into(),
            }),
            test: Some(Script {
                source: "teardown()".into(),
            }),
            ..folder(name, children)
        })
    }

    fn sample() -> Collection {
        Collection {
            name: "sample".into(),
            children: vec![
                item("one"),
                scripted_folder("auth", vec![item("login"), item("refresh")]),
                Node::Folder(folder("misc", vec![item("health")])),
                item("two"),
            ],
            ..Default::default()
        }
    }

    fn plan(include: &Selector, exclude: &Selector, strict: bool) -> Result<Vec<Step>> {
        let collection = sample();
        Planner::new(&collection, include, exclude).plan(strict)
    }

    fn names(steps: &[Step]) -> Vec<(StepKind, String)> {
        steps.iter().map(|s| (s.kind, s.name.clone())).collect()
    }

    #[test]
    fn preorder_with_folder_boundaries() -> Result<()> {
        let steps = plan(&Selector::None, &Selector::None, false)?;
        assert_eq!(
            names(&steps),
            vec![
                (StepKind::Request, "one".to_string()),
                (StepKind::FolderEnter, "auth".to_string()),
                (StepKind::Request, "login".to_string()),
                (StepKind::Request, "refresh".to_string()),
                (StepKind::FolderExit, "auth".to_string()),
                (StepKind::Request, "health".to_string()),
                (StepKind::Request, "two".to_string()),
            ]
        );
        // The unscripted folder contributes no synthetic steps.
        assert!(!steps.iter().any(|s| s.name == "misc"));
        // Items inside a folder record their path.
        let login = steps.iter().find(|s| s.name == "login").unwrap();
        assert_eq!(login.folder_path, vec!["auth".to_string()]);
        assert_eq!(login.enclosing_folder(), Some("auth"));
        Ok(())
    }

    #[test]
    fn replanning_is_deterministic() -> Result<()> {
        let a = plan(&Selector::None, &Selector::None, false)?;
        let b = plan(&Selector::None, &Selector::None, false)?;
        assert_eq!(names(&a), names(&b));
        Ok(())
    }

    #[test]
    fn folder_selector_restricts_traversal() -> Result<()> {
        let steps = plan(&Selector::from("auth"), &Selector::None, false)?;
        assert_eq!(
            names(&steps),
            vec![
                (StepKind::FolderEnter, "auth".to_string()),
                (StepKind::Request, "login".to_string()),
                (StepKind::Request, "refresh".to_string()),
                (StepKind::FolderExit, "auth".to_string()),
            ]
        );
        Ok(())
    }

    #[test]
    fn folder_selector_also_names_single_requests() -> Result<()> {
        let steps = plan(&Selector::from("two"), &Selector::None, false)?;
        assert_eq!(names(&steps), vec![(StepKind::Request, "two".to_string())]);
        Ok(())
    }

    #[test]
    fn unmatched_selector_yields_empty_plan() -> Result<()> {
        let steps = plan(&Selector::from("nope"), &Selector::None, false)?;
        assert!(steps.is_empty());
        Ok(())
    }

    #[test]
    fn unmatched_selector_errors_under_strict_lookup() {
        let err = plan(&Selector::from("nope"), &Selector::None, true).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unable to find a folder or request: nope"
        );
    }

    #[test]
    fn exclusion_wins_over_inclusion() -> Result<()> {
        let steps = plan(&Selector::from("auth"), &Selector::from("auth"), false)?;
        assert!(steps.is_empty());
        Ok(())
    }

    #[test]
    fn exclusion_prunes_nested_subtrees_of_an_included_folder() -> Result<()> {
        let collection = Collection {
            name: "nested".into(),
            children: vec![Node::Folder(folder(
                "outer",
                vec![
                    item("keep"),
                    Node::Folder(folder("inner", vec![item("drop")])),
                ],
            ))],
            ..Default::default()
        };
        let include = Selector::from("outer");
        let exclude = Selector::from("inner");
        let steps = Planner::new(&collection, &include, &exclude).plan(false)?;
        assert_eq!(names(&steps), vec![(StepKind::Request, "keep".to_string())]);
        Ok(())
    }
}
