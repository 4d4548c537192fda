//! history::changes
//!
//! Helpers over changed-path maps.

use crate::core::types::RevNum;
use crate::transport::{ChangeAction, ChangedPaths};

pub use crate::transport::{ChangedPath, CopyFrom};

/// Whether `path` is `branch_path` or lies below it.
///
/// ```
/// use svnbridge::history::changes::path_is_child;
///
/// assert!(path_is_child("trunk", "trunk/a"));
/// assert!(path_is_child("", "anything"));
/// assert!(!path_is_child("trunk", "trunkx"));
/// ```
pub fn path_is_child(branch_path: &str, path: &str) -> bool {
    branch_path.is_empty()
        || branch_path == path
        || (path.len() > branch_path.len()
            && path.starts_with(branch_path)
            && path.as_bytes()[branch_path.len()] == b'/')
}

/// Whether any change applies to `path` or something below it.
///
/// With `parents`, an added or replaced ancestor also counts.
pub fn changes_path(changes: &ChangedPaths, path: &str, parents: bool) -> bool {
    changes.iter().any(|(p, change)| {
        path_is_child(path, p)
            || (parents && change.action.creates_node() && p != path && path_is_child(p, path))
    })
}

/// The single path all `paths` lie under, if there is one.
pub fn changes_root<'a>(paths: impl IntoIterator<Item = &'a str>) -> Option<String> {
    let mut paths: Vec<&str> = paths.into_iter().collect();
    paths.sort_unstable();
    let (first, rest) = paths.split_first()?;
    let mut root = *first;
    for p in rest {
        if path_is_child(root, p) {
            continue;
        }
        if path_is_child(p, root) {
            root = p;
        } else {
            return None;
        }
    }
    Some(root.to_string())
}

/// Move `path` from below `orig_parent` to below `new_parent`.
pub fn rebase_path(path: &str, orig_parent: &str, new_parent: &str) -> String {
    let rest = path
        .get(orig_parent.len()..)
        .unwrap_or_default()
        .trim_matches('/');
    format!("{}/{}", new_parent, rest)
        .trim_matches('/')
        .to_string()
}

/// Map branch paths back to where they were before `changes` happened.
///
/// Returns `(new_path, old_path)` pairs; `old_path` is `None` for branches
/// the changes deleted.
pub fn apply_reverse_changes(
    branches: impl IntoIterator<Item = String>,
    changes: &ChangedPaths,
) -> Vec<(String, Option<String>)> {
    let mut live: Vec<String> = branches.into_iter().collect();
    let mut out = Vec::new();
    for (p, change) in changes {
        if change.action == ChangeAction::Delete {
            live.retain(|b| {
                if path_is_child(p, b) {
                    out.push((b.clone(), None));
                    false
                } else {
                    true
                }
            });
        } else if let Some(from) = &change.copyfrom {
            let mut moved = Vec::new();
            live.retain(|b| {
                if path_is_child(p, b) {
                    let old = rebase_path(b, p, &from.path);
                    out.push((b.clone(), Some(old.clone())));
                    moved.push(old);
                    false
                } else {
                    true
                }
            });
            live.extend(moved);
        }
    }
    out
}

/// Whether `path` lies under any of `prefixes` (an empty list matches all).
pub fn under_prefixes(path: &str, prefixes: &[String]) -> bool {
    prefixes.is_empty() || prefixes.iter().any(|prefix| path_is_child(prefix, path))
}

/// Where `path` lived one step before `revnum`, given that revision's
/// changes. `None` if it did not exist before.
pub fn find_prev_location(
    changes: &ChangedPaths,
    path: &str,
    revnum: RevNum,
) -> Option<(String, RevNum)> {
    if revnum == 0 {
        return None;
    }
    if path.is_empty() {
        return Some((String::new(), revnum - 1));
    }
    if let Some(change) = changes.get(path) {
        if change.action.creates_node() {
            return change
                .copyfrom
                .as_ref()
                .map(|from| (from.path.clone(), from.revnum));
        }
    }
    // longest ancestor first
    for (p, change) in changes.iter().rev() {
        if !change.action.creates_node() || p == path || !path_is_child(p, path) {
            continue;
        }
        return change
            .copyfrom
            .as_ref()
            .map(|from| (rebase_path(path, p, &from.path), from.revnum));
    }
    Some((path.to_string(), revnum - 1))
}

/// Restrict `changes` to `path`, its subtree, and its added or replaced
/// ancestors.
pub fn filter_changes(changes: &ChangedPaths, path: &str) -> ChangedPaths {
    changes
        .iter()
        .filter(|(p, change)| {
            path_is_child(path, p)
                || (change.action.creates_node() && path_is_child(p, path))
        })
        .map(|(p, change)| (p.clone(), change.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn changes(entries: &[(&str, char, Option<(&str, RevNum)>)]) -> ChangedPaths {
        entries
            .iter()
            .map(|(path, action, from)| {
                let action = ChangeAction::from_char(*action).unwrap();
                let change = match from {
                    Some((p, r)) => ChangedPath::copied(action, CopyFrom::new(*p, *r)),
                    None => ChangedPath::new(action),
                };
                (path.to_string(), change)
            })
            .collect()
    }

    #[test]
    fn child_relation() {
        assert!(path_is_child("a", "a"));
        assert!(path_is_child("a", "a/b/c"));
        assert!(!path_is_child("a/b", "a"));
        assert!(!path_is_child("ab", "abc"));
    }

    #[test]
    fn changes_path_with_parents() {
        let c = changes(&[("branches/x", 'A', Some(("trunk", 3)))]);
        assert!(changes_path(&c, "branches", false));
        assert!(!changes_path(&c, "branches/x/src", false));
        assert!(changes_path(&c, "branches/x/src", true));
        let m = changes(&[("trunk", 'M', None)]);
        assert!(!changes_path(&m, "trunk/a", true));
    }

    #[test]
    fn root_of_changes() {
        assert_eq!(changes_root(["a/b", "a", "a/c"]).as_deref(), Some("a"));
        assert_eq!(changes_root(["a/b", "c"]), None);
        assert_eq!(changes_root(Vec::<&str>::new()), None);
    }

    #[test]
    fn rebase() {
        assert_eq!(rebase_path("branches/x/src/a", "branches/x", "trunk"), "trunk/src/a");
        assert_eq!(rebase_path("branches/x", "branches/x", "trunk"), "trunk");
        assert_eq!(rebase_path("x/a", "x", ""), "a");
    }

    #[test]
    fn reverse_changes() {
        let c = changes(&[
            ("branches/old", 'D', None),
            ("branches/new", 'A', Some(("trunk", 4))),
        ]);
        let mut moved = apply_reverse_changes(
            vec!["branches/new".to_string(), "branches/old".to_string(), "tags/1".to_string()],
            &c,
        );
        moved.sort();
        assert_eq!(
            moved,
            vec![
                ("branches/new".to_string(), Some("trunk".to_string())),
                ("branches/old".to_string(), None),
            ]
        );
    }

    #[test]
    fn prev_location_rules() {
        assert_eq!(find_prev_location(&ChangedPaths::new(), "", 0), None);
        assert_eq!(
            find_prev_location(&ChangedPaths::new(), "", 5),
            Some((String::new(), 4))
        );
        let copied = changes(&[("branches/x", 'A', Some(("trunk", 3)))]);
        assert_eq!(
            find_prev_location(&copied, "branches/x", 5),
            Some(("trunk".to_string(), 3))
        );
        assert_eq!(
            find_prev_location(&copied, "branches/x/src/a", 5),
            Some(("trunk/src/a".to_string(), 3))
        );
        let added = changes(&[("trunk", 'A', None)]);
        assert_eq!(find_prev_location(&added, "trunk", 1), None);
        assert_eq!(find_prev_location(&added, "trunk/a", 1), None);
        assert_eq!(
            find_prev_location(&added, "other", 1),
            Some(("other".to_string(), 0))
        );
    }

    #[test]
    fn filter_keeps_subtree_and_copied_ancestors() {
        let c = changes(&[
            ("branches/x", 'A', Some(("trunk", 3))),
            ("branches", 'M', None),
            ("branches/x/a", 'M', None),
            ("tags/1", 'A', None),
        ]);
        let f = filter_changes(&c, "branches/x/a");
        assert_eq!(f.len(), 2);
        assert!(f.contains_key("branches/x"));
        assert!(under_prefixes("trunk/a", &["trunk".to_string()]));
        assert!(under_prefixes("x", &[]));
    }
}
