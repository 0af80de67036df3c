//! An augmented AVL tree of `[low, high)` intervals.
//!
//! Nodes live in a [`SlotMap`] arena and link to each other through
//! [`IntervalId`] handles, so rotations only ever rewrite index fields.
//! Every node also tracks the largest `high` in its subtree, which lets point
//! queries skip whole subtrees that end before the point.

use crate::common::{ensure_time, IntervalId, Seconds};
use crate::error::ClockError;
use slotmap::SlotMap;

/// A stored interval and its payload.
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalEvent<T> {
    pub low: Seconds,
    pub high: Seconds,
    pub payload: T,
}

impl<T> IntervalEvent<T> {
    pub fn duration(&self) -> Seconds {
        self.high - self.low
    }

    /// Whether `point` falls inside `[low, high)`.
    pub fn covers(&self, point: Seconds) -> bool {
        self.low <= point && point < self.high
    }
}

#[derive(Debug, Clone)]
struct Node<T> {
    event: IntervalEvent<T>,
    max: Seconds,
    height: i32,
    parent: Option<IntervalId>,
    left: Option<IntervalId>,
    right: Option<IntervalId>,
}

/// A height-balanced interval tree keyed by `low`.
#[derive(Debug, Clone)]
pub struct IntervalTree<T> {
    nodes: SlotMap<IntervalId, Node<T>>,
    root: Option<IntervalId>,
}

impl<T> Default for IntervalTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> IntervalTree<T> {
    pub fn new() -> Self {
        Self {
            nodes: SlotMap::with_key(),
            root: None,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Looks an interval up by handle.
    pub fn interval(&self, id: IntervalId) -> Option<&IntervalEvent<T>> {
        self.nodes.get(id).map(|n| &n.event)
    }

    /// Inserts the interval `[low, low + duration)` and returns its handle.
    pub fn add(&mut self, low: Seconds, duration: Seconds, payload: T) -> Result<IntervalId, ClockError> {
        ensure_time(low)?;
        if !(duration.is_finite() && duration >= 0.0) {
            return Err(ClockError::InvalidDuration(duration));
        }
        let high = low + duration;
        let id = self.nodes.insert(Node {
            event: IntervalEvent { low, high, payload },
            max: high,
            height: 0,
            parent: None,
            left: None,
            right: None,
        });

        let Some(mut cursor) = self.root else {
            self.root = Some(id);
            return Ok(id);
        };
        loop {
            let node = &self.nodes[cursor];
            let next = if low < node.event.low { node.left } else { node.right };
            match next {
                Some(child) => cursor = child,
                None => {
                    if low < self.nodes[cursor].event.low {
                        self.nodes[cursor].left = Some(id);
                    } else {
                        self.nodes[cursor].right = Some(id);
                    }
                    self.nodes[id].parent = Some(cursor);
                    break;
                }
            }
        }
        self.retrace(Some(cursor));
        Ok(id)
    }

    /// Removes an interval, returning it if the handle was live.
    pub fn remove(&mut self, id: IntervalId) -> Option<IntervalEvent<T>> {
        let (parent, left, right) = {
            let node = self.nodes.get(id)?;
            (node.parent, node.left, node.right)
        };

        match (left, right) {
            (None, None) => {
                self.replace_child(parent, id, None);
                self.retrace(parent);
            }
            (Some(child), None) | (None, Some(child)) => {
                self.replace_child(parent, id, Some(child));
                self.retrace(parent);
            }
            (Some(left), Some(right)) => {
                let retrace_from = if self.balance(id) > 0 {
                    self.promote_predecessor(id, left, right)
                } else {
                    self.promote_successor(id, left, right)
                };
                self.retrace(Some(retrace_from));
            }
        }
        self.nodes.remove(id).map(|n| n.event)
    }

    /// Replaces `node` (which has two children) with the rightmost node of
    /// its left subtree. Returns the lowest node whose subtree changed.
    fn promote_predecessor(&mut self, node: IntervalId, left: IntervalId, right: IntervalId) -> IntervalId {
        let parent = self.nodes[node].parent;
        let mut replacement = left;
        while let Some(next) = self.nodes[replacement].right {
            replacement = next;
        }

        let changed = if replacement == left {
            replacement
        } else {
            let replacement_parent = self.parent_of(replacement);
            let orphan = self.nodes[replacement].left;
            self.nodes[replacement_parent].right = orphan;
            if let Some(orphan) = orphan {
                self.nodes[orphan].parent = Some(replacement_parent);
            }
            self.nodes[replacement].left = Some(left);
            self.nodes[left].parent = Some(replacement);
            replacement_parent
        };
        self.nodes[replacement].right = Some(right);
        self.nodes[right].parent = Some(replacement);
        self.replace_child(parent, node, Some(replacement));
        changed
    }

    /// Mirror image of [`promote_predecessor`](Self::promote_predecessor).
    fn promote_successor(&mut self, node: IntervalId, left: IntervalId, right: IntervalId) -> IntervalId {
        let parent = self.nodes[node].parent;
        let mut replacement = right;
        while let Some(next) = self.nodes[replacement].left {
            replacement = next;
        }

        let changed = if replacement == right {
            replacement
        } else {
            let replacement_parent = self.parent_of(replacement);
            let orphan = self.nodes[replacement].right;
            self.nodes[replacement_parent].left = orphan;
            if let Some(orphan) = orphan {
                self.nodes[orphan].parent = Some(replacement_parent);
            }
            self.nodes[replacement].right = Some(right);
            self.nodes[right].parent = Some(replacement);
            replacement_parent
        };
        self.nodes[replacement].left = Some(left);
        self.nodes[left].parent = Some(replacement);
        self.replace_child(parent, node, Some(replacement));
        changed
    }

    /// Parent of a node that is known not to be the root.
    fn parent_of(&self, id: IntervalId) -> IntervalId {
        match self.nodes[id].parent {
            Some(parent) => parent,
            None => unreachable!("interior node without a parent"),
        }
    }

    /// Points `parent`'s link to `old` at `new` instead (or the root link when
    /// `parent` is `None`).
    fn replace_child(&mut self, parent: Option<IntervalId>, old: IntervalId, new: Option<IntervalId>) {
        match parent {
            Some(p) => {
                if self.nodes[p].left == Some(old) {
                    self.nodes[p].left = new;
                } else {
                    self.nodes[p].right = new;
                }
            }
            None => self.root = new,
        }
        if let Some(n) = new {
            self.nodes[n].parent = parent;
        }
    }

    fn height(&self, id: Option<IntervalId>) -> i32 {
        id.map_or(-1, |n| self.nodes[n].height)
    }

    fn balance(&self, id: IntervalId) -> i32 {
        let node = &self.nodes[id];
        self.height(node.left) - self.height(node.right)
    }

    /// Recomputes a node's height and max-high from its children.
    fn update(&mut self, id: IntervalId) {
        let (left, right, high) = {
            let node = &self.nodes[id];
            (node.left, node.right, node.event.high)
        };
        let height = 1 + self.height(left).max(self.height(right));
        let mut max = high;
        for child in [left, right].into_iter().flatten() {
            max = max.max(self.nodes[child].max);
        }
        let node = &mut self.nodes[id];
        node.height = height;
        node.max = max;
    }

    /// Walks from `start` to the root, updating and rebalancing every node.
    fn retrace(&mut self, start: Option<IntervalId>) {
        let mut cursor = start;
        while let Some(id) = cursor {
            let top = self.rebalance(id);
            cursor = self.nodes[top].parent;
        }
    }

    /// Restores the AVL condition at `id`; returns the root of the subtree
    /// that now occupies `id`'s position.
    fn rebalance(&mut self, id: IntervalId) -> IntervalId {
        self.update(id);
        let balance = self.balance(id);
        if balance > 1 {
            if let Some(left) = self.nodes[id].left {
                if self.balance(left) < 0 {
                    self.rotate_left(left);
                }
            }
            self.rotate_right(id)
        } else if balance < -1 {
            if let Some(right) = self.nodes[id].right {
                if self.balance(right) > 0 {
                    self.rotate_right(right);
                }
            }
            self.rotate_left(id)
        } else {
            id
        }
    }

    fn rotate_left(&mut self, id: IntervalId) -> IntervalId {
        let Some(pivot) = self.nodes[id].right else {
            return id;
        };
        let parent = self.nodes[id].parent;
        let inner = self.nodes[pivot].left;

        self.nodes[id].right = inner;
        if let Some(inner) = inner {
            self.nodes[inner].parent = Some(id);
        }
        self.replace_child(parent, id, Some(pivot));
        self.nodes[pivot].left = Some(id);
        self.nodes[id].parent = Some(pivot);

        self.update(id);
        self.update(pivot);
        pivot
    }

    fn rotate_right(&mut self, id: IntervalId) -> IntervalId {
        let Some(pivot) = self.nodes[id].left else {
            return id;
        };
        let parent = self.nodes[id].parent;
        let inner = self.nodes[pivot].right;

        self.nodes[id].left = inner;
        if let Some(inner) = inner {
            self.nodes[inner].parent = Some(id);
        }
        self.replace_child(parent, id, Some(pivot));
        self.nodes[pivot].right = Some(id);
        self.nodes[id].parent = Some(pivot);

        self.update(id);
        self.update(pivot);
        pivot
    }

    /// Collects the ids of every interval covering `point`.
    fn search(&self, point: Seconds) -> Vec<IntervalId> {
        let mut results = Vec::new();
        let mut stack: Vec<IntervalId> = self.root.into_iter().collect();
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id];
            // nothing below ends after the point
            if node.max <= point {
                continue;
            }
            if node.event.covers(point) {
                results.push(id);
            }
            if let Some(left) = node.left {
                stack.push(left);
            }
            // everything to the right starts at or after this node
            if node.event.low <= point {
                if let Some(right) = node.right {
                    stack.push(right);
                }
            }
        }
        results
    }

    /// Ids of every interval with `low >= point`, in `low` order.
    fn search_from(&self, point: Seconds) -> Vec<IntervalId> {
        let mut results = Vec::new();
        self.collect_from(self.root, point, &mut results);
        results
    }

    fn collect_from(&self, id: Option<IntervalId>, point: Seconds, results: &mut Vec<IntervalId>) {
        let Some(id) = id else { return };
        let node = &self.nodes[id];
        if node.event.low >= point {
            self.collect_from(node.left, point, results);
            results.push(id);
        }
        self.collect_from(node.right, point, results);
    }

    fn in_order(&self) -> Vec<IntervalId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = Vec::new();
        let mut cursor = self.root;
        while cursor.is_some() || !stack.is_empty() {
            while let Some(id) = cursor {
                stack.push(id);
                cursor = self.nodes[id].left;
            }
            if let Some(id) = stack.pop() {
                order.push(id);
                cursor = self.nodes[id].right;
            }
        }
        order
    }

    /// The interval covering `point` that started most recently.
    pub fn get(&self, point: Seconds) -> Option<&IntervalEvent<T>> {
        self.search(point)
            .into_iter()
            .map(|id| &self.nodes[id].event)
            .fold(None, |best: Option<&IntervalEvent<T>>, event| match best {
                Some(b) if b.low >= event.low => Some(b),
                _ => Some(event),
            })
    }

    /// Visits every interval covering `point`.
    pub fn for_each_at_time(&self, point: Seconds, mut callback: impl FnMut(IntervalId, &IntervalEvent<T>)) {
        for id in self.search(point) {
            callback(id, &self.nodes[id].event);
        }
    }

    /// Visits every interval starting at or after `point`, in start order.
    pub fn for_each_from(&self, point: Seconds, mut callback: impl FnMut(IntervalId, &IntervalEvent<T>)) {
        for id in self.search_from(point) {
            callback(id, &self.nodes[id].event);
        }
    }

    /// Visits every interval in start order.
    pub fn for_each(&self, mut callback: impl FnMut(IntervalId, &IntervalEvent<T>)) {
        for id in self.in_order() {
            callback(id, &self.nodes[id].event);
        }
    }

    /// Removes every interval starting at or after `after`.
    pub fn cancel(&mut self, after: Seconds) {
        for id in self.search_from(after) {
            self.remove(id);
        }
    }
}
