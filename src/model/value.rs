// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Triton-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Triton and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use super::tree::NodeId;

/// A value returned by a frontend when a computed property is evaluated.
///
/// The set is open-ended through [`HostValue::Custom`]: anything with a textual representation
/// can be handed back and will be encoded line by line.
#[derive(Clone)]
pub enum HostValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Node(NodeId),
    Custom(Arc<dyn fmt::Display + Send + Sync>),
    List(HostList),
}

impl HostValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn custom(value: impl fmt::Display + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(value))
    }

    pub fn list(items: impl IntoIterator<Item = HostValue>) -> Self {
        Self::List(HostList::new(items))
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Replaces every back-reference from a list to a list containing it with `Null`, so the
    /// shared storage can be freed. Returns the number of references replaced.
    ///
    /// Acyclic sharing is left alone. Walks depth-first without recursion.
    pub fn break_cycles(&self) -> usize {
        enum Visit {
            Enter(HostList),
            Exit(usize),
        }

        let Self::List(root) = self else {
            return 0;
        };
        let mut on_path = HashSet::new();
        let mut finished = HashSet::new();
        let mut stack = vec![Visit::Enter(root.clone())];
        let mut broken = 0;
        while let Some(visit) = stack.pop() {
            let list = match visit {
                Visit::Exit(identity) => {
                    on_path.remove(&identity);
                    finished.insert(identity);
                    continue;
                }
                Visit::Enter(list) => list,
            };
            let identity = list.identity();
            if finished.contains(&identity) {
                continue;
            }
            on_path.insert(identity);
            stack.push(Visit::Exit(identity));
            for item in list.lock().iter_mut() {
                let Self::List(child) = item else {
                    continue;
                };
                let child_identity = child.identity();
                if on_path.contains(&child_identity) {
                    *item = Self::Null;
                    broken += 1;
                } else if !finished.contains(&child_identity) {
                    stack.push(Visit::Enter(child.clone()));
                }
            }
        }
        broken
    }
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("Null"),
            Self::Bool(value) => f.debug_tuple("Bool").field(value).finish(),
            Self::Int(value) => f.debug_tuple("Int").field(value).finish(),
            Self::Float(value) => f.debug_tuple("Float").field(value).finish(),
            Self::Text(value) => f.debug_tuple("Text").field(value).finish(),
            Self::Node(id) => f.debug_tuple("Node").field(id).finish(),
            Self::Custom(value) => f.debug_tuple("Custom").field(&value.to_string()).finish(),
            // Lists may contain themselves; print identity only.
            Self::List(list) => write!(f, "List(@{:#x})", list.identity()),
        }
    }
}

impl From<bool> for HostValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for HostValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<String> for HostValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for HostValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<NodeId> for HostValue {
    fn from(value: NodeId) -> Self {
        Self::Node(value)
    }
}

/// Shared, mutable collection with reference identity.
///
/// Cloning shares the underlying storage, which is what lets a list contain itself.
#[derive(Clone, Default)]
pub struct HostList {
    items: Arc<Mutex<Vec<HostValue>>>,
}

impl HostList {
    pub fn new(items: impl IntoIterator<Item = HostValue>) -> Self {
        Self { items: Arc::new(Mutex::new(items.into_iter().collect())) }
    }

    pub fn push(&self, value: HostValue) {
        self.lock().push(value);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of the current elements; the lock is not held while callers walk them.
    pub fn snapshot(&self) -> Vec<HostValue> {
        self.lock().clone()
    }

    /// Address of the shared storage, stable for the lifetime of the list.
    pub fn identity(&self) -> usize {
        Arc::as_ptr(&self.items) as *const () as usize
    }

    fn lock(&self) -> MutexGuard<'_, Vec<HostValue>> {
        self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
