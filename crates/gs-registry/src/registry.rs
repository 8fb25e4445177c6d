//! Multi-key object index.

use std::collections::{BTreeMap, BTreeSet};

use gs_core::{ObjectId, ObjectMeta};

use crate::error::{RegistryError, RegistryResult};

/// Anything the registry can index.
pub trait Indexed {
    fn object_id(&self) -> Option<ObjectId>;
    fn name(&self) -> &str;
    fn user_id(&self) -> Option<u32>;
    fn parent(&self) -> Option<ObjectId>;
}

impl Indexed for ObjectMeta {
    fn object_id(&self) -> Option<ObjectId> {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn user_id(&self) -> Option<u32> {
        self.user_id
    }

    fn parent(&self) -> Option<ObjectId> {
        self.parent
    }
}

/// Snapshot of the keys an object was indexed under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub name: String,
    pub user_id: Option<u32>,
    pub parent: Option<ObjectId>,
}

/// Index over id, name and user id.
///
/// Ids and non-empty names are unique. Unnamed objects are only reachable by
/// id. User ids are not unique: [`find_by_user_id`] returns every holder in
/// id order.
///
/// [`find_by_user_id`]: ObjectRegistry::find_by_user_id
#[derive(Debug, Clone, Default)]
pub struct ObjectRegistry {
    by_id: BTreeMap<ObjectId, RegistryEntry>,
    by_name: BTreeMap<String, ObjectId>,
    by_user_id: BTreeSet<(u32, ObjectId)>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered objects.
    pub fn size(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Add `obj`. With `replace == false` an existing id or name makes the
    /// call fail and leaves the registry untouched; with `replace == true`
    /// the conflicting entries are dropped first.
    pub fn insert<T: Indexed + ?Sized>(&mut self, obj: &T, replace: bool) -> bool {
        self.try_insert(obj, replace).is_ok()
    }

    /// Like [`insert`](Self::insert) but reports why it was refused.
    pub fn try_insert<T: Indexed + ?Sized>(&mut self, obj: &T, replace: bool) -> RegistryResult<()> {
        let id = obj.object_id().ok_or_else(|| RegistryError::Unregistered {
            name: obj.name().to_string(),
        })?;
        let name = obj.name();
        let name_holder = self.name_holder(name);

        if !replace {
            if self.by_id.contains_key(&id) {
                return Err(RegistryError::DuplicateId { id });
            }
            if let Some(holder) = name_holder {
                return Err(RegistryError::DuplicateName {
                    name: name.to_string(),
                    holder,
                });
            }
        } else {
            self.remove_id(id);
            if let Some(holder) = name_holder {
                self.remove_id(holder);
            }
        }

        self.index(id, obj);
        Ok(())
    }

    /// Drop `obj`'s entry. False if it is not a member.
    pub fn remove<T: Indexed + ?Sized>(&mut self, obj: &T) -> bool {
        match obj.object_id() {
            Some(id) if self.is_member(obj) => self.remove_id(id).is_some(),
            _ => false,
        }
    }

    /// Drop the entry registered under `name`.
    pub fn remove_by_name(&mut self, name: &str) -> bool {
        match self.name_holder(name) {
            Some(id) => self.remove_id(id).is_some(),
            None => false,
        }
    }

    /// Drop the entry registered under `id`, returning it.
    pub fn remove_id(&mut self, id: ObjectId) -> Option<RegistryEntry> {
        let entry = self.by_id.remove(&id)?;
        self.unindex_keys(id, &entry);
        Some(entry)
    }

    pub fn find(&self, name: &str) -> Option<ObjectId> {
        self.name_holder(name)
    }

    /// Every object sharing `user_id`, in id order.
    pub fn find_by_user_id(&self, user_id: u32) -> Vec<ObjectId> {
        let lo = (user_id, ObjectId::from_index(0));
        self.by_user_id
            .range(lo..)
            .take_while(|(uid, _)| *uid == user_id)
            .map(|(_, id)| *id)
            .collect()
    }

    pub fn get(&self, id: ObjectId) -> Option<&RegistryEntry> {
        self.by_id.get(&id)
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.by_id.contains_key(&id)
    }

    /// True when `obj`'s id is registered under `obj`'s current name.
    pub fn is_member<T: Indexed + ?Sized>(&self, obj: &T) -> bool {
        obj.object_id()
            .and_then(|id| self.by_id.get(&id))
            .is_some_and(|entry| entry.name == obj.name())
    }

    /// Re-index `obj` after its name, user id or parent changed.
    ///
    /// Fails without changes if `obj` is unknown or its new name belongs to
    /// another object.
    pub fn update_object<T: Indexed + ?Sized>(&mut self, obj: &T) -> RegistryResult<()> {
        let id = obj.object_id().ok_or_else(|| RegistryError::Unregistered {
            name: obj.name().to_string(),
        })?;
        if !self.by_id.contains_key(&id) {
            return Err(RegistryError::UnknownId { id });
        }
        if let Some(holder) = self.name_holder(obj.name()).filter(|h| *h != id) {
            return Err(RegistryError::DuplicateName {
                name: obj.name().to_string(),
                holder,
            });
        }
        self.remove_id(id);
        self.index(id, obj);
        Ok(())
    }

    /// Move the entry at `old` to `obj`'s (new) id.
    pub fn update_id<T: Indexed + ?Sized>(&mut self, old: ObjectId, obj: &T) -> RegistryResult<()> {
        let new = obj.object_id().ok_or_else(|| RegistryError::Unregistered {
            name: obj.name().to_string(),
        })?;
        if !self.by_id.contains_key(&old) {
            return Err(RegistryError::UnknownId { id: old });
        }
        if new != old && self.by_id.contains_key(&new) {
            return Err(RegistryError::DuplicateId { id: new });
        }
        if let Some(holder) = self
            .name_holder(obj.name())
            .filter(|h| *h != old && *h != new)
        {
            return Err(RegistryError::DuplicateName {
                name: obj.name().to_string(),
                holder,
            });
        }
        self.remove_id(old);
        // Children keep pointing at the owner under its new id.
        if new != old {
            for entry in self.by_id.values_mut() {
                if entry.parent == Some(old) {
                    entry.parent = Some(new);
                }
            }
        }
        self.index(new, obj);
        Ok(())
    }

    /// Remove every entry owned, directly or transitively, by `parent`.
    ///
    /// `parent` itself is kept. Returns the removed ids in id order so the
    /// owner can drop the matching objects.
    pub fn delete_all(&mut self, parent: ObjectId) -> Vec<ObjectId> {
        let doomed: Vec<ObjectId> = self
            .by_id
            .keys()
            .copied()
            .filter(|id| self.owned_by(*id, parent))
            .collect();
        for id in &doomed {
            self.remove_id(*id);
        }
        doomed
    }

    /// Ids in increasing order.
    pub fn ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.by_id.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &RegistryEntry)> {
        self.by_id.iter().map(|(id, e)| (*id, e))
    }

    pub fn clear(&mut self) {
        self.by_id.clear();
        self.by_name.clear();
        self.by_user_id.clear();
    }

    fn name_holder(&self, name: &str) -> Option<ObjectId> {
        if name.is_empty() {
            return None;
        }
        self.by_name.get(name).copied()
    }

    fn owned_by(&self, id: ObjectId, owner: ObjectId) -> bool {
        let mut cursor = self.by_id.get(&id).and_then(|e| e.parent);
        // Bounded walk: a corrupted chain cannot loop forever.
        for _ in 0..self.by_id.len() {
            match cursor {
                Some(p) if p == owner => return true,
                Some(p) => cursor = self.by_id.get(&p).and_then(|e| e.parent),
                None => return false,
            }
        }
        false
    }

    fn index<T: Indexed + ?Sized>(&mut self, id: ObjectId, obj: &T) {
        let entry = RegistryEntry {
            name: obj.name().to_string(),
            user_id: obj.user_id(),
            parent: obj.parent(),
        };
        if !entry.name.is_empty() {
            self.by_name.insert(entry.name.clone(), id);
        }
        if let Some(uid) = entry.user_id {
            self.by_user_id.insert((uid, id));
        }
        self.by_id.insert(id, entry);
    }

    fn unindex_keys(&mut self, id: ObjectId, entry: &RegistryEntry) {
        if self.by_name.get(&entry.name) == Some(&id) {
            self.by_name.remove(&entry.name);
        }
        if let Some(uid) = entry.user_id {
            self.by_user_id.remove(&(uid, id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(index: u32, name: &str) -> ObjectMeta {
        let mut m = ObjectMeta::new(name);
        m.id = Some(ObjectId::from_index(index));
        m
    }

    #[test]
    fn insert_and_find() {
        let mut reg = ObjectRegistry::new();
        let bus = meta(1, "bus1");
        assert!(reg.insert(&bus, false));
        assert_eq!(reg.find("bus1"), bus.id);
        assert!(reg.is_member(&bus));
        assert_eq!(reg.size(), 1);
    }

    #[test]
    fn unregistered_object_is_refused() {
        let mut reg = ObjectRegistry::new();
        let loose = ObjectMeta::new("loose");
        assert!(!reg.insert(&loose, false));
        assert!(matches!(
            reg.try_insert(&loose, true),
            Err(RegistryError::Unregistered { .. })
        ));
        assert!(reg.is_empty());
    }

    #[test]
    fn duplicate_name_without_replace_leaves_registry_unchanged() {
        let mut reg = ObjectRegistry::new();
        let a = meta(1, "load");
        let b = meta(2, "load");
        assert!(reg.insert(&a, false));
        assert!(!reg.insert(&b, false));
        assert_eq!(reg.size(), 1);
        assert_eq!(reg.find("load"), a.id);
        assert!(!reg.contains(ObjectId::from_index(2)));
    }

    #[test]
    fn duplicate_id_without_replace_fails() {
        let mut reg = ObjectRegistry::new();
        assert!(reg.insert(&meta(1, "a"), false));
        assert_eq!(
            reg.try_insert(&meta(1, "b"), false),
            Err(RegistryError::DuplicateId {
                id: ObjectId::from_index(1)
            })
        );
        assert_eq!(reg.find("a"), Some(ObjectId::from_index(1)));
        assert_eq!(reg.find("b"), None);
    }

    #[test]
    fn replace_drops_conflicting_entries() {
        let mut reg = ObjectRegistry::new();
        assert!(reg.insert(&meta(1, "a"), false));
        assert!(reg.insert(&meta(2, "b"), false));
        // Same id as "a", same name as "b".
        assert!(reg.insert(&meta(1, "b"), true));
        assert_eq!(reg.size(), 1);
        assert_eq!(reg.find("b"), Some(ObjectId::from_index(1)));
        assert_eq!(reg.find("a"), None);
    }

    #[test]
    fn rename_then_update_object() {
        let mut reg = ObjectRegistry::new();
        let mut obj = meta(3, "old");
        reg.insert(&obj, false);
        obj.name = "new".into();
        assert!(!reg.is_member(&obj));
        reg.update_object(&obj).unwrap();
        assert_eq!(reg.find("new"), obj.id);
        assert_eq!(reg.find("old"), None);
        assert!(reg.is_member(&obj));
    }

    #[test]
    fn rename_onto_taken_name_fails() {
        let mut reg = ObjectRegistry::new();
        let a = meta(1, "a");
        let mut b = meta(2, "b");
        reg.insert(&a, false);
        reg.insert(&b, false);
        b.name = "a".into();
        assert!(matches!(
            reg.update_object(&b),
            Err(RegistryError::DuplicateName { .. })
        ));
        assert_eq!(reg.find("b"), b.id);
        assert_eq!(reg.find("a"), a.id);
    }

    #[test]
    fn user_ids_are_not_unique() {
        let mut reg = ObjectRegistry::new();
        reg.insert(&meta(5, "x").with_user_id(7), false);
        reg.insert(&meta(2, "y").with_user_id(7), false);
        reg.insert(&meta(3, "z").with_user_id(8), false);
        assert_eq!(
            reg.find_by_user_id(7),
            vec![ObjectId::from_index(2), ObjectId::from_index(5)]
        );
        assert_eq!(reg.find_by_user_id(9), Vec::<ObjectId>::new());
    }

    #[test]
    fn remove_by_name_and_object() {
        let mut reg = ObjectRegistry::new();
        let a = meta(1, "a");
        let b = meta(2, "b").with_user_id(4);
        reg.insert(&a, false);
        reg.insert(&b, false);
        assert!(reg.remove_by_name("a"));
        assert!(!reg.remove_by_name("a"));
        assert!(reg.remove(&b));
        assert!(!reg.remove(&b));
        assert!(reg.find_by_user_id(4).is_empty());
        assert!(reg.is_empty());
    }

    #[test]
    fn unnamed_objects_do_not_collide() {
        let mut reg = ObjectRegistry::new();
        assert!(reg.insert(&meta(1, ""), false));
        assert!(reg.insert(&meta(2, ""), false));
        assert_eq!(reg.size(), 2);
        assert_eq!(reg.find(""), None);
    }

    #[test]
    fn update_id_moves_entry_and_children() {
        let mut reg = ObjectRegistry::new();
        let mut owner = meta(1, "owner");
        let child = meta(2, "child").with_parent(ObjectId::from_index(1));
        reg.insert(&owner, false);
        reg.insert(&child, false);
        owner.id = Some(ObjectId::from_index(9));
        reg.update_id(ObjectId::from_index(1), &owner).unwrap();
        assert_eq!(reg.find("owner"), Some(ObjectId::from_index(9)));
        assert!(!reg.contains(ObjectId::from_index(1)));
        assert_eq!(
            reg.delete_all(ObjectId::from_index(9)),
            vec![ObjectId::from_index(2)]
        );
    }

    #[test]
    fn delete_all_follows_ownership_chain() {
        let mut reg = ObjectRegistry::new();
        let root = ObjectId::from_index(1);
        let area = ObjectId::from_index(2);
        reg.insert(&meta(1, "root"), false);
        reg.insert(&meta(2, "area").with_parent(root), false);
        reg.insert(&meta(3, "bus").with_parent(area), false);
        reg.insert(&meta(4, "other"), false);
        let removed = reg.delete_all(root);
        assert_eq!(
            removed,
            vec![ObjectId::from_index(2), ObjectId::from_index(3)]
        );
        assert!(reg.contains(root));
        assert!(reg.contains(ObjectId::from_index(4)));
        assert_eq!(reg.size(), 2);
    }
}
