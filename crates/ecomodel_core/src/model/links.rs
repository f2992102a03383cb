//! Cross-reference maintenance across copy boundaries.
//!
//! # Responsibility
//! - Break links that point outside the owning aggregate.
//! - Repair broken (or any) links against a candidate pool.
//! - Collapse duplicate in-memory instances into shared ones.
//!
//! # Invariants
//! - A broken link points at a hollow placeholder; it is never dropped.
//! - Policy flags are explicit arguments, never ambient state.
//! - Aggregates recurse into owned children with themselves as the
//!   owning parent; leaf kinds other than timesteps hold no links.

use crate::model::error::ModelResult;
use crate::model::graph::{Handle, ModelGraph};
use crate::model::object::{ObjectKind, SlotRole};
use crate::template::pool::TemplatePool;
use log::debug;
use serde::{Deserialize, Serialize};

/// Relinking policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkPolicy {
    /// Non-template holders may also match against templates.
    pub auto_match_templates: bool,
    /// Search templates before local objects.
    pub prefer_templates: bool,
}

impl ModelGraph {
    /// Returns whether any link slot of `handle` points at a placeholder.
    pub fn has_broken_link(&self, handle: Handle) -> bool {
        let Some(object) = self.get(handle) else {
            return false;
        };
        object
            .links()
            .into_iter()
            .any(|target| self.get(target).is_some_and(|linked| linked.is_broken()))
    }

    /// Flags every link of `handle` that is not a direct child of
    /// `owning_parent` as broken. Returns the number of links changed.
    ///
    /// A link already pointing at a direct child stays; a broken link whose
    /// original is now a direct child is relinked to it.
    pub fn break_links(
        &mut self,
        handle: Handle,
        owning_parent: Option<Handle>,
    ) -> ModelResult<usize> {
        let object = self.object(handle)?;
        let kind = object.kind();
        let children = object.owned_children();
        let links = object.links();
        match kind {
            ObjectKind::ClassDef | ObjectKind::Element => {
                let mut changed = 0;
                for child in children {
                    changed += self.break_links(child, Some(handle))?;
                }
                Ok(changed)
            }
            ObjectKind::Timestep => {
                let direct_children = owning_parent
                    .and_then(|parent| self.get(parent))
                    .map(|parent| parent.owned_children())
                    .unwrap_or_default();

                let mut changed = 0;
                for target in links {
                    if direct_children.contains(&target) {
                        continue;
                    }
                    let replacement = if self.object(target)?.is_broken() {
                        direct_children
                            .iter()
                            .copied()
                            .find(|child| self.structural_compare(target, *child, true))
                    } else {
                        Some(self.copy_hollow(target)?)
                    };
                    if let Some(replacement) = replacement {
                        self.relink(handle, target, replacement)?;
                        changed += 1;
                    }
                }
                if changed > 0 {
                    debug!(
                        "event=links_break module=links status=ok handle={} changed={}",
                        handle, changed
                    );
                }
                Ok(changed)
            }
            _ => Ok(0),
        }
    }

    /// Replaces links of `handle` with superficially equal candidates.
    ///
    /// Candidates are the pool's templates when the holder is a template;
    /// otherwise `owning_parent`'s direct children, plus the pool's templates
    /// when `policy.auto_match_templates` is set. `policy.prefer_templates`
    /// searches templates first. With `only_if_broken`, healthy links are
    /// left alone. Returns the number of links replaced.
    pub fn repair_links(
        &mut self,
        handle: Handle,
        only_if_broken: bool,
        pool: &TemplatePool,
        owning_parent: Option<Handle>,
        policy: LinkPolicy,
    ) -> ModelResult<usize> {
        let object = self.object(handle)?;
        let kind = object.kind();
        let children = object.owned_children();
        let links = object.links();
        let holder_is_template = object.is_template();
        match kind {
            ObjectKind::ClassDef | ObjectKind::Element => {
                let mut repaired = 0;
                for child in children {
                    repaired +=
                        self.repair_links(child, only_if_broken, pool, Some(handle), policy)?;
                }
                Ok(repaired)
            }
            ObjectKind::Timestep => {
                let mut repaired = 0;
                for target in links {
                    let Some(linked) = self.get(target) else {
                        continue;
                    };
                    if only_if_broken && !linked.is_broken() {
                        continue;
                    }

                    let candidates = self.link_candidates(
                        linked.kind(),
                        holder_is_template,
                        pool,
                        owning_parent,
                        policy,
                    );
                    let matched = candidates
                        .into_iter()
                        .find(|candidate| self.structural_compare(target, *candidate, true));
                    if let Some(matched) = matched.filter(|matched| *matched != target) {
                        self.relink(handle, target, matched)?;
                        repaired += 1;
                    }
                }
                if repaired > 0 {
                    debug!(
                        "event=links_repair module=links status=ok handle={} repaired={}",
                        handle, repaired
                    );
                }
                Ok(repaired)
            }
            _ => Ok(0),
        }
    }

    /// Collapses duplicate instances reachable from `handle` into shared ones.
    ///
    /// Every reachable object is offered to a throwaway pool (deduplicated
    /// superficially), then links are repaired against it with template
    /// auto-matching forced on for this call only.
    pub fn remake_links(&mut self, handle: Handle, policy: LinkPolicy) -> ModelResult<usize> {
        let mut scratch = TemplatePool::new();
        for reachable in self.reachable(handle) {
            scratch.insert_once(self, reachable);
        }

        let forced = LinkPolicy {
            auto_match_templates: true,
            ..policy
        };
        let relinked = self.repair_links(handle, false, &scratch, None, forced)?;
        debug!(
            "event=links_remake module=links status=ok handle={} relinked={}",
            handle, relinked
        );
        Ok(relinked)
    }

    fn link_candidates(
        &self,
        kind: ObjectKind,
        holder_is_template: bool,
        pool: &TemplatePool,
        owning_parent: Option<Handle>,
        policy: LinkPolicy,
    ) -> Vec<Handle> {
        let templates = pool.handles(kind).to_vec();
        if holder_is_template {
            return templates;
        }

        let locals = owning_parent
            .map(|parent| self.children_of_kind(parent, kind))
            .unwrap_or_default();
        if !policy.auto_match_templates {
            return locals;
        }
        if policy.prefer_templates {
            templates.into_iter().chain(locals).collect()
        } else {
            locals.into_iter().chain(templates).collect()
        }
    }

    fn relink(&mut self, holder: Handle, from: Handle, to: Handle) -> ModelResult<()> {
        let object = self.object_mut(holder)?;
        object.map_slots(|role, current| {
            if role == SlotRole::Link && current == from {
                to
            } else {
                current
            }
        });
        object.touch();
        Ok(())
    }
}
