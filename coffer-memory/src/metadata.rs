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

//! Grouping and query metadata.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Secondary-index metadata attached to an entry: attribute name to value.
pub type QueryInfo = BTreeMap<String, serde_json::Value>;

/// Data group membership of an entry.
///
/// A group with an empty name is represented by the absence of a [`GroupInfo`]; use [`GroupInfo::new`], which
/// returns `None` in that case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupInfo {
    group: String,
    subgroup: Option<String>,
    type_name: Option<String>,
}

impl GroupInfo {
    /// Group info for `group`/`subgroup`, or `None` when the group name is empty.
    pub fn new(group: impl Into<String>, subgroup: Option<String>) -> Option<Self> {
        let group = group.into();
        if group.is_empty() {
            return None;
        }
        Some(Self {
            group,
            subgroup: subgroup.filter(|s| !s.is_empty()),
            type_name: None,
        })
    }

    /// Attach the stored object's type name.
    pub fn with_type_name(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    /// Group name.
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Subgroup name.
    pub fn subgroup(&self) -> Option<&str> {
        self.subgroup.as_deref()
    }

    /// Type name of the stored object.
    pub fn type_name(&self) -> Option<&str> {
        self.type_name.as_deref()
    }

    /// Estimated memory footprint.
    pub fn in_memory_size(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.group.len()
            + self.subgroup.as_ref().map_or(0, String::len)
            + self.type_name.as_ref().map_or(0, String::len)
    }
}

/// If an entry of group `stored` may be replaced by one of group `incoming`.
///
/// Two ungrouped entries are compatible. Grouped entries are compatible when group and subgroup both match.
pub fn is_group_compatible(stored: Option<&GroupInfo>, incoming: Option<&GroupInfo>) -> bool {
    match (stored, incoming) {
        (None, None) => true,
        (Some(a), Some(b)) => a.group == b.group && a.subgroup == b.subgroup,
        _ => false,
    }
}

/// Estimated memory footprint of query metadata.
pub fn query_info_size(info: &QueryInfo) -> usize {
    info.iter().map(|(k, v)| k.len() + v.to_string().len()).sum()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_empty_group_is_absent() {
        assert!(GroupInfo::new("", Some("sub".to_string())).is_none());
        let group = GroupInfo::new("orders", Some(String::new())).unwrap();
        assert_eq!(group.group(), "orders");
        assert_eq!(group.subgroup(), None);
    }

    #[test]
    fn test_group_compatibility() {
        let a = GroupInfo::new("orders", Some("eu".to_string()));
        let b = GroupInfo::new("orders", Some("us".to_string()));
        let typed = a.clone().map(|g| g.with_type_name("Order"));

        assert!(is_group_compatible(None, None));
        assert!(is_group_compatible(a.as_ref(), typed.as_ref()));
        assert!(!is_group_compatible(a.as_ref(), b.as_ref()));
        assert!(!is_group_compatible(a.as_ref(), None));
        assert!(!is_group_compatible(None, b.as_ref()));
    }

    #[test]
    fn test_group_info_serde() {
        let group = GroupInfo::new("orders", None).unwrap().with_type_name("Order");
        let json = serde_json::to_string(&group).unwrap();
        assert_eq!(serde_json::from_str::<GroupInfo>(&json).unwrap(), group);

        let mut info = QueryInfo::new();
        info.insert("region".to_string(), json!("eu"));
        assert_eq!(query_info_size(&info), "region".len() + "\"eu\"".len());
    }
}
