//! Privilege level tree and path queries.

use std::collections::HashMap;

use indexmap::{IndexMap, IndexSet};

use crate::error::{DriverError, PlatformError, Result};
use crate::platform::PrivilegeLevel;

/// Direction of a single privilege hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivilegeAction {
    /// Enter a child level using its escalate command.
    Escalate,
    /// Return to the parent level using the current level's deescalate command.
    Deescalate,
    /// Already at the target.
    NoAction,
}

/// One step of a privilege path: move to `level` by `action`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hop {
    /// Level reached by this hop.
    pub level: String,
    /// How the level is reached.
    pub action: PrivilegeAction,
}

/// Ordered hops from one level to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivilegePath {
    /// Overall direction tag; `NoAction` for an empty path.
    pub action: PrivilegeAction,
    /// Hops in execution order.
    pub hops: Vec<Hop>,
}

impl PrivilegePath {
    /// Whether there is nothing to do.
    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }
}

/// Tree of privilege levels built from parent declarations.
///
/// Read-only once built. Every level except the single root names exactly
/// one parent, so any two levels are connected by exactly one path: up to
/// the lowest common ancestor, then down.
#[derive(Debug, Clone)]
pub struct PrivilegeGraph {
    levels: IndexMap<String, PrivilegeLevel>,
    children: HashMap<String, IndexSet<String>>,
    root: String,
}

impl PrivilegeGraph {
    /// Build and validate the tree.
    ///
    /// Fails if a parent reference dangles, if there is not exactly one
    /// root, if a non-root level cannot be entered or left, or if the parent
    /// chain loops.
    pub fn build(levels: IndexMap<String, PrivilegeLevel>) -> Result<Self> {
        let roots: Vec<String> = levels
            .values()
            .filter(|level| level.is_root())
            .map(|level| level.name.clone())
            .collect();

        let root = match roots.as_slice() {
            [] => return Err(PlatformError::MissingRoot.into()),
            [root] => root.clone(),
            _ => return Err(PlatformError::AmbiguousRoot { roots }.into()),
        };

        let mut children: HashMap<String, IndexSet<String>> = HashMap::new();
        for (name, level) in &levels {
            children.entry(name.clone()).or_default();

            let Some(parent) = &level.previous_priv else {
                continue;
            };
            if !levels.contains_key(parent) {
                return Err(PlatformError::DanglingParent {
                    level: name.clone(),
                    parent: parent.clone(),
                }
                .into());
            }
            if level.escalate_command.as_deref().is_none_or(str::is_empty) {
                return Err(PlatformError::MissingTransition {
                    level: name.clone(),
                    command: "escalate",
                }
                .into());
            }
            if level.deescalate_command.as_deref().is_none_or(str::is_empty) {
                return Err(PlatformError::MissingTransition {
                    level: name.clone(),
                    command: "deescalate",
                }
                .into());
            }
            children.entry(parent.clone()).or_default().insert(name.clone());
        }

        let graph = Self {
            levels,
            children,
            root,
        };

        // A parent cycle would leave its members unreachable from the root.
        for name in graph.levels.keys() {
            if graph.ancestors(name).last().map(|s| s.as_str()) != Some(graph.root.as_str()) {
                return Err(PlatformError::InvalidDefinition {
                    message: format!("privilege level '{name}' is not connected to the root"),
                }
                .into());
            }
        }

        Ok(graph)
    }

    /// The root level name.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Get a privilege level by name.
    pub fn get(&self, name: &str) -> Option<&PrivilegeLevel> {
        self.levels.get(name)
    }

    /// All levels in configuration order.
    pub fn levels(&self) -> impl Iterator<Item = &PrivilegeLevel> {
        self.levels.values()
    }

    /// Levels whose parent is `name`.
    pub fn children(&self, name: &str) -> impl Iterator<Item = &str> {
        self.children
            .get(name)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    /// `name` followed by its parent chain up to the root.
    ///
    /// Stops early on a cycle.
    fn ancestors(&self, name: &str) -> Vec<&String> {
        let mut chain = Vec::new();
        let mut next = self.levels.get_key_value(name).map(|(k, _)| k);
        while let Some(current) = next {
            if chain.contains(&current) {
                break;
            }
            chain.push(current);
            next = self
                .levels
                .get(current)
                .and_then(|level| level.previous_priv.as_ref());
        }
        chain
    }

    /// Hops from `from` to `to`: deescalate to the lowest common ancestor,
    /// then escalate down to `to`.
    pub fn path_to(&self, from: &str, to: &str) -> Result<PrivilegePath> {
        if !self.levels.contains_key(to) {
            return Err(DriverError::InvalidDesiredPrivilege {
                name: to.to_string(),
            }
            .into());
        }
        if !self.levels.contains_key(from) {
            return Err(DriverError::CouldNotDeterminePrivilege {
                prompt: from.to_string(),
            }
            .into());
        }

        if from == to {
            return Ok(PrivilegePath {
                action: PrivilegeAction::NoAction,
                hops: Vec::new(),
            });
        }

        let up = self.ancestors(from);
        let down = self.ancestors(to);

        let common = up
            .iter()
            .position(|name| down.contains(name))
            .unwrap_or(up.len() - 1);
        let ancestor = up[common];

        let mut hops: Vec<Hop> = up[1..=common]
            .iter()
            .map(|name| Hop {
                level: (*name).clone(),
                action: PrivilegeAction::Deescalate,
            })
            .collect();

        let descend = down
            .iter()
            .position(|name| *name == ancestor)
            .unwrap_or(down.len());
        hops.extend(down[..descend].iter().rev().map(|name| Hop {
            level: (*name).clone(),
            action: PrivilegeAction::Escalate,
        }));

        let action = hops
            .first()
            .map_or(PrivilegeAction::NoAction, |hop| hop.action);

        Ok(PrivilegePath { action, hops })
    }
}
