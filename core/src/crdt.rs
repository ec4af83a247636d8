//! Observed-remove shopping list.
//!
//! Every add and remove carries a globally unique tag. A replica admits a
//! remote entry exactly once (tags it has already processed are dropped), so
//! merging the same state any number of times, in any order, yields the same
//! add/remove sets. The visible list is always computed from the two sets,
//! never stored.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ListError;
use crate::protocol;

/// Unique identifier of a single add or remove operation.
///
/// Tags exist only so merges can deduplicate; they are never reused and never
/// compared for anything but equality and ordering.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tag(String);

impl Tag {
    /// A fresh tag: random UUID plus the wall-clock instant it was minted.
    pub fn fresh() -> Self {
        Tag(format!("{}-{}", Uuid::new_v4(), Utc::now().to_rfc3339()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One tagged operation: `quantity` units of `name` were added (or removed).
///
/// On the wire and on disk an entry is the 3-element array
/// `[name, quantity, tag]`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "EntryWire", into = "EntryWire")]
pub struct Entry {
    pub name: String,
    pub quantity: i64,
    pub tag: Tag,
}

#[derive(Serialize, Deserialize)]
struct EntryWire(String, i64, Tag);

impl From<Entry> for EntryWire {
    fn from(e: Entry) -> Self {
        EntryWire(e.name, e.quantity, e.tag)
    }
}

impl From<EntryWire> for Entry {
    fn from(w: EntryWire) -> Self {
        Entry {
            name: w.0,
            quantity: w.1,
            tag: w.2,
        }
    }
}

/// Serialized form of a [`ShoppingList`]: what peers exchange and what the
/// `Storage` collaborator persists.
///
/// Entry order carries no meaning (the sets are sets), but serialization is
/// stable: entries are emitted in sorted order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListState {
    #[serde(rename = "listID")]
    pub list_id: String,
    pub add_set: Vec<Entry>,
    pub remove_set: Vec<Entry>,
}

/// An OR-Set shopping list.
///
/// `processed` remembers every tag this replica has ever admitted, add or
/// remove, which is what makes [`ShoppingList::merge`] idempotent and
/// duplicate-safe. It is rebuilt from the two sets when a list is loaded, so
/// it never needs to be persisted separately.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShoppingList {
    list_id: String,
    add_set: BTreeSet<Entry>,
    remove_set: BTreeSet<Entry>,
    processed: BTreeSet<Tag>,
}

impl ShoppingList {
    pub fn new(list_id: impl Into<String>) -> Self {
        Self {
            list_id: list_id.into(),
            add_set: BTreeSet::new(),
            remove_set: BTreeSet::new(),
            processed: BTreeSet::new(),
        }
    }

    /// A new empty list with a freshly derived identity.
    pub fn with_fresh_id() -> Self {
        Self::new(protocol::fresh_list_id())
    }

    pub fn list_id(&self) -> &str {
        &self.list_id
    }

    /// Record that `quantity` units of `name` are wanted. Always succeeds.
    pub fn add(&mut self, name: &str, quantity: i64) {
        let tag = Tag::fresh();
        self.processed.insert(tag.clone());
        self.add_set.insert(Entry {
            name: name.to_string(),
            quantity,
            tag,
        });
    }

    /// Record that `quantity` units of `name` were acquired.
    ///
    /// Fails with [`ListError::ItemNotFound`] when no add-entry exists for
    /// `name`. Entries already offset by earlier removes still count as
    /// existing; the net quantity is irrelevant here, and may legally go
    /// negative once concurrent removes from other replicas merge in.
    pub fn remove(&mut self, name: &str, quantity: i64) -> Result<(), ListError> {
        if !self.add_set.iter().any(|e| e.name == name) {
            return Err(ListError::ItemNotFound(name.to_string()));
        }
        let tag = Tag::fresh();
        self.processed.insert(tag.clone());
        self.remove_set.insert(Entry {
            name: name.to_string(),
            quantity,
            tag,
        });
        Ok(())
    }

    /// Name → net quantity for every name appearing in either set.
    ///
    /// This is a stable snapshot computed on demand, never a live view.
    pub fn view(&self) -> BTreeMap<String, i64> {
        let mut items = BTreeMap::new();
        for entry in &self.add_set {
            *items.entry(entry.name.clone()).or_insert(0) += entry.quantity;
        }
        for entry in &self.remove_set {
            *items.entry(entry.name.clone()).or_insert(0) -= entry.quantity;
        }
        items
    }

    /// Merge a remote state into this replica.
    ///
    /// Entries whose tag was already processed are dropped silently; that is
    /// the expected path, not an error. No ordering between concurrent merges
    /// is required: merge is commutative, associative and idempotent.
    pub fn merge(&mut self, other: &ListState) {
        for entry in &other.add_set {
            if self.processed.insert(entry.tag.clone()) {
                self.add_set.insert(entry.clone());
            }
        }
        for entry in &other.remove_set {
            if self.processed.insert(entry.tag.clone()) {
                self.remove_set.insert(entry.clone());
            }
        }
    }

    /// Serialize into the wire/persisted shape. Entries come out in sorted
    /// order, so equal lists serialize identically.
    pub fn to_state(&self) -> ListState {
        ListState {
            list_id: self.list_id.clone(),
            add_set: self.add_set.iter().cloned().collect(),
            remove_set: self.remove_set.iter().cloned().collect(),
        }
    }

    /// Rebuild a replica from its serialized form. The processed-tag set is
    /// rederived from the entries themselves.
    pub fn from_state(state: ListState) -> Self {
        let add_set: BTreeSet<Entry> = state.add_set.into_iter().collect();
        let remove_set: BTreeSet<Entry> = state.remove_set.into_iter().collect();
        let processed = add_set
            .iter()
            .chain(remove_set.iter())
            .map(|e| e.tag.clone())
            .collect();
        Self {
            list_id: state.list_id,
            add_set,
            remove_set,
            processed,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.add_set.is_empty() && self.remove_set.is_empty()
    }
}

impl From<ListState> for ShoppingList {
    fn from(state: ListState) -> Self {
        Self::from_state(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_partial_remove_nets_out() {
        let mut list = ShoppingList::new("groceries");
        list.add("milk", 2);
        list.remove("milk", 1).unwrap();
        assert_eq!(list.view().get("milk"), Some(&1));
    }

    #[test]
    fn remove_unknown_item_fails_and_leaves_state_untouched() {
        let mut list = ShoppingList::new("groceries");
        list.add("milk", 2);
        let before = list.clone();

        let err = list.remove("eggs", 1).unwrap_err();
        assert_eq!(err, ListError::ItemNotFound("eggs".to_string()));
        assert_eq!(list, before);
    }

    #[test]
    fn remove_checks_add_set_not_net_quantity() {
        let mut list = ShoppingList::new("groceries");
        list.add("milk", 1);
        list.remove("milk", 1).unwrap();
        // Net quantity is zero, but the add-entry still exists.
        list.remove("milk", 1).unwrap();
        assert_eq!(list.view().get("milk"), Some(&-1));
    }

    #[test]
    fn merge_is_commutative() {
        let mut a = ShoppingList::new("l");
        a.add("milk", 2);
        a.add("bread", 1);
        let mut b = ShoppingList::new("l");
        b.add("eggs", 6);
        b.add("milk", 1);
        b.remove("milk", 1).unwrap();

        let mut ab = a.clone();
        ab.merge(&b.to_state());
        let mut ba = b.clone();
        ba.merge(&a.to_state());

        assert_eq!(ab, ba);
        assert_eq!(ab.view(), ba.view());
    }

    #[test]
    fn merge_is_associative() {
        let mut a = ShoppingList::new("l");
        a.add("milk", 2);
        let mut b = ShoppingList::new("l");
        b.add("eggs", 6);
        let mut c = ShoppingList::new("l");
        c.add("bread", 1);

        // (a ⊔ b) ⊔ c
        let mut left = a.clone();
        left.merge(&b.to_state());
        left.merge(&c.to_state());

        // a ⊔ (b ⊔ c)
        let mut bc = b.clone();
        bc.merge(&c.to_state());
        let mut right = a.clone();
        right.merge(&bc.to_state());

        assert_eq!(left, right);
    }

    #[test]
    fn merge_is_idempotent() {
        let mut a = ShoppingList::new("l");
        a.add("milk", 2);
        a.remove("milk", 1).unwrap();
        let state = a.to_state();

        let once = {
            let mut l = a.clone();
            l.merge(&state);
            l
        };
        assert_eq!(once, a);

        let mut thrice = a.clone();
        thrice.merge(&state);
        thrice.merge(&state);
        thrice.merge(&state);
        assert_eq!(thrice, a);
    }

    #[test]
    fn divergent_replicas_converge_regardless_of_merge_order() {
        let mut left = ShoppingList::new("shared");
        let mut right = ShoppingList::new("shared");

        left.add("milk", 3);
        left.add("apples", 4);
        right.add("eggs", 12);
        right.add("milk", 1);
        right.remove("milk", 1).unwrap();

        let left_state = left.to_state();
        let right_state = right.to_state();

        left.merge(&right_state);
        right.merge(&left_state);

        assert_eq!(left.view(), right.view());
        assert_eq!(left, right);
        assert_eq!(left.view().get("milk"), Some(&3));
    }

    #[test]
    fn serialization_round_trips_exactly() {
        let mut list = ShoppingList::new("roundtrip");
        list.add("milk", 2);
        list.add("bread", 1);
        list.remove("milk", 1).unwrap();

        let json = serde_json::to_string(&list.to_state()).unwrap();
        let state: ListState = serde_json::from_str(&json).unwrap();
        assert_eq!(ShoppingList::from_state(state), list);
    }

    #[test]
    fn entries_serialize_as_three_element_arrays() {
        let mut list = ShoppingList::new("wire");
        list.add("milk", 2);

        let value = serde_json::to_value(list.to_state()).unwrap();
        assert_eq!(value["listID"], "wire");
        let entry = &value["add_set"][0];
        assert!(entry.is_array());
        assert_eq!(entry[0], "milk");
        assert_eq!(entry[1], 2);
        assert!(entry[2].is_string());
    }

    #[test]
    fn tags_are_unique_across_operations() {
        let mut list = ShoppingList::new("tags");
        for _ in 0..50 {
            list.add("milk", 1);
        }
        let state = list.to_state();
        let tags: BTreeSet<&Tag> = state.add_set.iter().map(|e| &e.tag).collect();
        assert_eq!(tags.len(), 50);
    }

    #[test]
    fn fresh_ids_are_distinct() {
        assert_ne!(
            ShoppingList::with_fresh_id().list_id(),
            ShoppingList::with_fresh_id().list_id()
        );
    }
}
