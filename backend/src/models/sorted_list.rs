//! Due-date ordered payment list
//!
//! Doubly linked list of live payment identifiers, ascending by due date,
//! stored as an arena indexed by identifier. Identifier `0` is the null
//! sentinel so no node ever owns a reference to another.
//!
//! # Complexity
//!
//! - `earliest()` / `head()`: O(1)
//! - `remove()`: O(1)
//! - `insert()`: O(n) linear scan from the head
//!
//! The workload is dominated by "what is due next" reads, so insertion
//! speed is traded for a constant-time head.
//!
//! # Critical Invariants
//!
//! 1. **Ordering**: walking `next` from the head yields non-decreasing due dates
//! 2. **Symmetry**: `node(node(x).next).previous == x` for every linked `x`
//! 3. **Ties are FIFO**: a new entry goes after every entry with the same due date
//! 4. **Removed nodes are zeroed**: a removed id has `previous == next == 0`

use crate::models::payment::{PaymentId, SortedPayment};
use serde::{Deserialize, Serialize};

/// Arena-backed sorted list of payment identifiers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortedPaymentList {
    /// Payment with the earliest due date (`0` if empty)
    head: PaymentId,

    /// Node arena; index is the payment identifier, slot 0 is never used
    nodes: Vec<SortedPayment>,

    /// Number of linked payments
    len: usize,
}

impl SortedPaymentList {
    /// Create an empty list
    pub fn new() -> Self {
        Self {
            head: 0,
            nodes: vec![SortedPayment::default()],
            len: 0,
        }
    }

    /// Identifier of the payment with the earliest due date, `0` if empty
    pub fn head(&self) -> PaymentId {
        self.head
    }

    /// Due date stored at the head, `None` when the list is empty
    pub fn earliest(&self) -> Option<u64> {
        if self.head == 0 {
            None
        } else {
            Some(self.node(self.head).payment_due_date)
        }
    }

    /// Node for `id`; unknown ids return an all-zero node
    pub fn node(&self, id: PaymentId) -> SortedPayment {
        self.nodes.get(id as usize).copied().unwrap_or_default()
    }

    /// Whether `id` is currently linked
    ///
    /// Node shape alone cannot tell a singleton head from an absent id, so
    /// the head pointer is consulted too.
    pub fn contains(&self, id: PaymentId) -> bool {
        if id == 0 {
            return false;
        }
        let node = self.node(id);
        id == self.head || node.previous != 0 || node.next != 0
    }

    /// Number of linked payments
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the list is empty
    pub fn is_empty(&self) -> bool {
        self.head == 0
    }

    /// Last linked payment, `0` if empty
    pub fn tail(&self) -> PaymentId {
        let mut current = self.head;
        while current != 0 {
            let next = self.node(current).next;
            if next == 0 {
                return current;
            }
            current = next;
        }
        0
    }

    /// Iterate linked ids from head to tail
    pub fn iter(&self) -> SortedIter<'_> {
        SortedIter {
            list: self,
            current: self.head,
        }
    }

    /// Link `id` at its due-date position
    ///
    /// Scans from the head for the first node with a strictly later due
    /// date and splices `id` in front of it, or at the tail if none exists.
    /// An id that is already linked is moved. Id `0` is the null sentinel
    /// and is ignored.
    pub fn insert(&mut self, id: PaymentId, payment_due_date: u64) {
        if id == 0 {
            return;
        }

        if self.contains(id) {
            self.remove(id);
        }
        self.ensure_slot(id);

        if self.head == 0 {
            self.head = id;
            self.nodes[id as usize] = SortedPayment {
                previous: 0,
                next: 0,
                payment_due_date,
            };
            self.len += 1;
            return;
        }

        let mut previous: PaymentId = 0;
        let mut next: PaymentId = self.head;

        while next != 0 && self.node(next).payment_due_date <= payment_due_date {
            previous = next;
            next = self.node(next).next;
        }

        if previous != 0 {
            self.nodes[previous as usize].next = id;
        } else {
            self.head = id;
        }

        if next != 0 {
            self.nodes[next as usize].previous = id;
        }

        self.nodes[id as usize] = SortedPayment {
            previous,
            next,
            payment_due_date,
        };
        self.len += 1;
    }

    /// Unlink `id`; unknown or already removed ids are a no-op
    ///
    /// Returns whether anything was unlinked.
    pub fn remove(&mut self, id: PaymentId) -> bool {
        if !self.contains(id) {
            return false;
        }

        let SortedPayment { previous, next, .. } = self.node(id);

        if previous != 0 {
            self.nodes[previous as usize].next = next;
        }

        if next != 0 {
            self.nodes[next as usize].previous = previous;
        }

        if self.head == id {
            self.head = next;
        }

        self.nodes[id as usize] = SortedPayment::default();
        self.len -= 1;
        true
    }

    /// Rebuild from raw nodes (checkpoint restore)
    ///
    /// The caller validates link integrity before using the list.
    pub fn from_parts(head: PaymentId, linked: Vec<(PaymentId, SortedPayment)>) -> Self {
        let mut list = Self::new();
        list.head = head;
        for (id, node) in linked {
            list.ensure_slot(id);
            list.nodes[id as usize] = node;
        }
        list.len = list.iter().count();
        list
    }

    fn ensure_slot(&mut self, id: PaymentId) {
        let index = id as usize;
        if self.nodes.len() <= index {
            self.nodes.resize(index + 1, SortedPayment::default());
        }
    }
}

/// Head-to-tail iterator over linked payment ids
pub struct SortedIter<'a> {
    list: &'a SortedPaymentList,
    current: PaymentId,
}

impl<'a> Iterator for SortedIter<'a> {
    type Item = PaymentId;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current == 0 {
            return None;
        }
        let id = self.current;
        self.current = self.list.node(id).next;
        Some(id)
    }
}
