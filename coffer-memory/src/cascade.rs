// Copyright 2026 coffer Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Cascading removal of dependent entries.

use coffer_common::{code::Key, error::Result};
use hashbrown::HashSet;

/// Remove every key depending, directly or transitively, on `roots`, in breadth-first waves.
///
/// Each key is visited at most once per call, so dependency cycles terminate. `remove` reports whether the key was
/// still there; keys already gone are still expanded, since their dependents may outlive them. Failed removals are
/// logged and skipped. Returns the keys removed by this call, in removal order.
pub fn cascade<D, R>(roots: impl IntoIterator<Item = Key>, dependents_of: D, mut remove: R) -> Vec<Key>
where
    D: Fn(&str) -> Vec<Key>,
    R: FnMut(&Key) -> Result<bool>,
{
    let mut frontier: Vec<Key> = roots.into_iter().collect();
    let mut visited: HashSet<Key> = frontier.iter().cloned().collect();
    let mut removed = vec![];

    while !frontier.is_empty() {
        let mut next = vec![];
        for key in frontier.iter() {
            for dependent in dependents_of(key) {
                if !visited.insert(dependent.clone()) {
                    continue;
                }
                match remove(&dependent) {
                    Ok(true) => removed.push(dependent.clone()),
                    Ok(false) => {}
                    Err(e) => {
                        tracing::warn!(
                            "[cascade]: remove dependent {} of {} error: {}",
                            dependent,
                            key,
                            e
                        );
                    }
                }
                next.push(dependent);
            }
        }
        frontier = next;
    }

    if !removed.is_empty() {
        tracing::debug!("[cascade]: removed {} dependent entries", removed.len());
    }
    removed
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use coffer_common::error::{Error, ErrorKind};
    use itertools::Itertools;

    use super::*;

    fn key(s: &str) -> Key {
        s.into()
    }

    fn graph(edges: &[(&str, &str)]) -> HashMap<String, Vec<Key>> {
        let mut graph: HashMap<String, Vec<Key>> = HashMap::new();
        for (dependee, dependent) in edges {
            graph.entry(dependee.to_string()).or_default().push(key(dependent));
        }
        graph
    }

    #[test]
    fn test_chain_removes_each_once() {
        // k3 depends on k2 depends on k1
        let graph = graph(&[("k1", "k2"), ("k2", "k3")]);
        let mut calls = vec![];
        let removed = cascade(
            [key("k1")],
            |k| graph.get(k).cloned().unwrap_or_default(),
            |k| {
                calls.push(k.clone());
                Ok(true)
            },
        );
        assert_eq!(removed, vec![key("k2"), key("k3")]);
        assert_eq!(calls, removed);
    }

    #[test]
    fn test_cycle_terminates() {
        let graph = graph(&[("a", "b"), ("b", "c"), ("c", "a"), ("c", "b")]);
        let mut calls = vec![];
        let removed = cascade(
            [key("a")],
            |k| graph.get(k).cloned().unwrap_or_default(),
            |k| {
                calls.push(k.clone());
                Ok(true)
            },
        );
        assert_eq!(removed, vec![key("b"), key("c")]);
        assert_eq!(calls.iter().unique().count(), calls.len());
    }

    #[test]
    fn test_diamond_and_gone_keys() {
        // d depends on both b and c, which depend on a. b is already gone.
        let graph = graph(&[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")]);
        let removed = cascade(
            [key("a")],
            |k| graph.get(k).cloned().unwrap_or_default(),
            |k| Ok(k.as_ref() != "b"),
        );
        assert_eq!(removed, vec![key("c"), key("d")]);
    }

    #[test_log::test]
    fn test_failures_are_skipped() {
        let graph = graph(&[("a", "b"), ("b", "c")]);
        let removed = cascade(
            [key("a")],
            |k| graph.get(k).cloned().unwrap_or_default(),
            |k| match k.as_ref() {
                "b" => Err(Error::new(ErrorKind::OperationFailed, "boom")),
                _ => Ok(true),
            },
        );
        assert_eq!(removed, vec![key("c")]);
    }
}
