// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

pub mod executor;
pub mod reconciler;

use std::fmt::Write;

use crate::secret::{diff::{DiffType, SecretDiff}, Secret, TargetType};

/// One local secret and/or remote object, with the diff between them
#[derive(Debug, Clone)]
pub struct PlanItem {
    /// None for a remote object whose declaration has gone away
    pub local_secret: Option<Secret>,
    /// None when the object does not exist in the cluster yet
    pub remote_secret: Option<Secret>,
    pub diff: SecretDiff,
}

impl PlanItem {
    pub fn new(local_secret: Option<Secret>, remote_secret: Option<Secret>) -> Self {
        let diff = crate::secret::diff::compare(remote_secret.as_ref(), local_secret.as_ref());
        Self { local_secret, remote_secret, diff }
    }

    /// Cluster the item is applied to
    pub fn target(&self) -> Option<&str> {
        self.local_secret
            .as_ref()
            .or(self.remote_secret.as_ref())
            .map(|secret| secret.target.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Plan {
    pub target_type: TargetType,
    pub items: Vec<PlanItem>,
}

impl Plan {
    pub fn new(target_type: TargetType) -> Self {
        Self { target_type, items: Vec::new() }
    }

    pub fn add_item(&mut self, item: PlanItem) {
        self.items.push(item);
    }

    /// Whether executing the plan would change nothing
    pub fn nothing_to_do(&self) -> bool {
        self.items.iter().all(|item| item.diff.equal)
    }

    /// Counts of items to add, change and remove
    pub fn summary(&self) -> (usize, usize, usize) {
        self.items.iter().fold((0, 0, 0), |(add, change, remove), item| match item.diff.diff_type {
            DiffType::Added => (add + 1, change, remove),
            DiffType::Changed => (add, change + 1, remove),
            DiffType::Removed => (add, change, remove + 1),
            DiffType::Unchanged => (add, change, remove),
        })
    }

    /// Human readable plan. Unchanged items are listed only with `show_unchanged`.
    pub fn render(&self, show_unchanged: bool, cleartext: bool) -> String {
        let mut out = String::new();

        for item in &self.items {
            if item.diff.equal && !show_unchanged {
                continue;
            }
            let target = item.target().unwrap_or_default();
            let _ = write!(out, "[{}] {}", target, item.diff.render(cleartext));
        }

        let (add, change, remove) = self.summary();
        if add + change + remove == 0 {
            out.push_str("No changes. Everything is up to date.\n");
        } else {
            let _ = writeln!(out, "Plan: {} to add, {} to change, {} to remove.", add, change, remove);
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn secret(name: &str, value: &str) -> Secret {
        Secret {
            name: name.to_string(),
            namespace: "default".to_string(),
            target: "prod".to_string(),
            data: BTreeMap::from([("k".to_string(), value.to_string())]),
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_plan_is_nothing_to_do() {
        assert!(Plan::new(TargetType::Kubernetes).nothing_to_do());
    }

    #[test]
    fn test_equal_items_are_nothing_to_do() {
        let mut plan = Plan::new(TargetType::Kubernetes);
        plan.add_item(PlanItem::new(Some(secret("a", "1")), Some(secret("a", "1"))));
        assert!(plan.nothing_to_do());
        assert_eq!(plan.summary(), (0, 0, 0));

        plan.add_item(PlanItem::new(Some(secret("b", "1")), None));
        assert!(!plan.nothing_to_do());
    }

    #[test]
    fn test_render() {
        let mut plan = Plan::new(TargetType::Kubernetes);
        plan.add_item(PlanItem::new(Some(secret("same", "1")), Some(secret("same", "1"))));
        plan.add_item(PlanItem::new(Some(secret("new", "abc")), None));
        plan.add_item(PlanItem::new(None, Some(secret("old", "x"))));
        plan.add_item(PlanItem::new(Some(secret("edit", "2")), Some(secret("edit", "1"))));

        let rendered = plan.render(false, false);
        assert!(!rendered.contains("default/same"));
        assert!(rendered.contains("[prod] default/new: add\n  + data.k: ***\n"));
        assert!(rendered.contains("[prod] default/old: remove\n  - data.k: *\n"));
        assert!(rendered.contains("[prod] default/edit: change\n  ~ data.k: * => *\n"));
        assert!(rendered.ends_with("Plan: 1 to add, 1 to change, 1 to remove.\n"));

        let rendered = plan.render(true, true);
        assert!(rendered.contains("default/same: unchanged"));
        assert!(rendered.contains("~ data.k: 1 => 2"));
    }
}
