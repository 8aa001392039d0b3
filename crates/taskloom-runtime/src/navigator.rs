use std::collections::{BTreeMap, HashSet};

use taskloom_types::ConversationSkeleton;

/// Read-only queries over the reconstructed task forest.
///
/// Every walk is cycle-safe behind an explicit visited set, and a
/// malformed or missing skeleton is omitted rather than an error.
pub struct TaskNavigator<'a> {
    skeletons: &'a BTreeMap<String, ConversationSkeleton>,
}

impl<'a> TaskNavigator<'a> {
    pub fn new(skeletons: &'a BTreeMap<String, ConversationSkeleton>) -> Self {
        Self { skeletons }
    }

    fn known(&self, task_id: &str) -> bool {
        self.skeletons.contains_key(task_id)
    }

    /// Effective parent: reconstructed edge first, recorded edge only
    /// when it points at a known task.
    pub fn parent(&self, task_id: &str) -> Option<&'a ConversationSkeleton> {
        let skeleton = self.skeletons.get(task_id)?;
        let parent_id = skeleton.effective_parent_id(|id| self.known(id))?;
        self.skeletons.get(parent_id)
    }

    /// Children of a task, in ascending task-id order (stable).
    pub fn children(&self, task_id: &str) -> Vec<&'a ConversationSkeleton> {
        self.skeletons
            .values()
            .filter(|candidate| {
                candidate
                    .effective_parent_id(|id| self.known(id))
                    .is_some_and(|parent| parent == task_id)
            })
            .collect()
    }

    /// Ancestor chain, nearest first, up to `max_depth`.
    pub fn ancestors(&self, task_id: &str, max_depth: usize) -> Vec<&'a ConversationSkeleton> {
        let mut chain = Vec::new();
        let mut visited: HashSet<&str> = HashSet::new();
        visited.insert(task_id);

        let mut current = task_id;
        while chain.len() < max_depth {
            let Some(parent) = self.parent(current) else {
                break;
            };
            if !visited.insert(parent.task_id.as_str()) {
                break;
            }
            chain.push(parent);
            current = parent.task_id.as_str();
        }
        chain
    }

    /// Siblings: tasks sharing this task's effective parent, ordered by
    /// `last_activity`. Without `include_subsequent` only those whose
    /// activity precedes this task's are returned.
    pub fn siblings(&self, task_id: &str, include_subsequent: bool) -> Vec<&'a ConversationSkeleton> {
        let Some(skeleton) = self.skeletons.get(task_id) else {
            return Vec::new();
        };
        let Some(parent_id) = skeleton.effective_parent_id(|id| self.known(id)) else {
            return Vec::new();
        };

        let mut siblings: Vec<&ConversationSkeleton> = self
            .children(parent_id)
            .into_iter()
            .filter(|candidate| candidate.task_id != task_id)
            .filter(|candidate| {
                include_subsequent
                    || candidate.metadata.last_activity <= skeleton.metadata.last_activity
            })
            .collect();

        siblings.sort_by(|a, b| {
            a.metadata
                .last_activity
                .cmp(&b.metadata.last_activity)
                .then_with(|| a.task_id.cmp(&b.task_id))
        });
        siblings
    }

    /// Depth-first subtree rooted at `task_id`, the root included, cut
    /// at `max_depth` levels below the root.
    pub fn subtree(&self, task_id: &str, max_depth: usize) -> Vec<&'a ConversationSkeleton> {
        let Some(root) = self.skeletons.get(task_id) else {
            return Vec::new();
        };

        let mut out = Vec::new();
        let mut visited: HashSet<&str> = HashSet::new();
        let mut stack: Vec<(&ConversationSkeleton, usize)> = vec![(root, 0)];

        while let Some((node, depth)) = stack.pop() {
            if !visited.insert(node.task_id.as_str()) {
                continue;
            }
            out.push(node);
            if depth < max_depth {
                // Reverse so the smallest task id pops first
                for child in self.children(&node.task_id).into_iter().rev() {
                    stack.push((child, depth + 1));
                }
            }
        }
        out
    }

    /// Tasks with no effective parent, ascending task-id order.
    pub fn roots(&self) -> Vec<&'a ConversationSkeleton> {
        self.skeletons
            .values()
            .filter(|s| s.effective_parent_id(|id| self.known(id)).is_none())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use std::path::PathBuf;
    use taskloom_types::SkeletonMetadata;

    fn skeleton(id: &str, parent: Option<&str>, minutes: i64) -> ConversationSkeleton {
        let mut s = ConversationSkeleton::new(
            id,
            SkeletonMetadata::new(PathBuf::from("/t"), Utc::now() + Duration::minutes(minutes)),
        );
        s.metadata.last_activity = s.metadata.created_at;
        s.reconstructed_parent_id = parent.map(|p| p.to_string());
        s
    }

    fn forest() -> BTreeMap<String, ConversationSkeleton> {
        // root -> a (t+1), b (t+2); a -> a1 (t+3)
        let mut map = BTreeMap::new();
        for s in [
            skeleton("root", None, 0),
            skeleton("a", Some("root"), 1),
            skeleton("b", Some("root"), 2),
            skeleton("a1", Some("a"), 3),
        ] {
            map.insert(s.task_id.clone(), s);
        }
        map
    }

    #[test]
    fn parent_and_children() {
        let map = forest();
        let nav = TaskNavigator::new(&map);

        assert_eq!(nav.parent("a").unwrap().task_id, "root");
        assert!(nav.parent("root").is_none());

        let kids: Vec<&str> = nav.children("root").iter().map(|s| s.task_id.as_str()).collect();
        assert_eq!(kids, vec!["a", "b"]);
    }

    #[test]
    fn dangling_recorded_parent_is_ignored() {
        let mut map = forest();
        let mut orphan = skeleton("orphan", None, 5);
        orphan.parent_task_id = Some("deleted-task".to_string());
        map.insert(orphan.task_id.clone(), orphan);

        let nav = TaskNavigator::new(&map);
        assert!(nav.parent("orphan").is_none());
        assert!(nav.roots().iter().any(|s| s.task_id == "orphan"));
    }

    #[test]
    fn ancestors_respect_depth_and_cycles() {
        let map = forest();
        let nav = TaskNavigator::new(&map);

        let chain: Vec<&str> = nav.ancestors("a1", 10).iter().map(|s| s.task_id.as_str()).collect();
        assert_eq!(chain, vec!["a", "root"]);
        assert_eq!(nav.ancestors("a1", 1).len(), 1);

        // Manufactured cycle must terminate
        let mut cyclic = BTreeMap::new();
        for s in [skeleton("x", Some("y"), 0), skeleton("y", Some("x"), 1)] {
            cyclic.insert(s.task_id.clone(), s);
        }
        let nav = TaskNavigator::new(&cyclic);
        assert!(nav.ancestors("x", 100).len() <= 2);
    }

    #[test]
    fn siblings_filter_by_activity() {
        let map = forest();
        let nav = TaskNavigator::new(&map);

        // b is newer than a: a has no preceding siblings, b has one
        assert!(nav.siblings("a", false).is_empty());
        let before_b: Vec<&str> = nav.siblings("b", false).iter().map(|s| s.task_id.as_str()).collect();
        assert_eq!(before_b, vec!["a"]);

        let all: Vec<&str> = nav.siblings("a", true).iter().map(|s| s.task_id.as_str()).collect();
        assert_eq!(all, vec!["b"]);
    }

    #[test]
    fn subtree_is_depth_first_and_bounded() {
        let map = forest();
        let nav = TaskNavigator::new(&map);

        let ids: Vec<&str> = nav.subtree("root", 10).iter().map(|s| s.task_id.as_str()).collect();
        assert_eq!(ids, vec!["root", "a", "a1", "b"]);

        let shallow: Vec<&str> = nav.subtree("root", 1).iter().map(|s| s.task_id.as_str()).collect();
        assert_eq!(shallow, vec!["root", "a", "b"]);
    }
}
