// ABOUTME: Open-addressed hash table keyed by (name, scope-id), shared by
// every environment frame of a session; quadratic probing with tombstones

use crate::value::Slot;
use std::fmt::Write;
use thiserror::Error;

/// Binding names are bounded; longer names are rejected at bind time.
pub const VARIABLE_MAX_LENGTH: usize = 128;

const MAX_LOAD_FACTOR: f64 = 0.7;

const PRIMES: [usize; 26] = [
    53, 97, 193, 389, 769, 1543, 3079, 6151, 12289, 24593, 49157, 98317, 196613, 393241, 786433,
    1572869, 3145739, 6291469, 12582917, 25165843, 50331653, 100663319, 201326611, 402653189,
    805306457, 1610612741,
];

#[derive(Debug, Clone, Error)]
pub enum BindError {
    #[error("cannot assign to constant '{0}'")]
    AssignToConst(String),

    #[error("cannot redefine '{0}' as constant")]
    ConstRedefine(String),

    #[error("identifier '{0}' exceeds {VARIABLE_MAX_LENGTH} bytes")]
    NameTooLong(String),
}

#[derive(Debug)]
struct Entry {
    key: String,
    scope: usize,
    value: Slot,
    is_const: bool,
}

#[derive(Debug)]
enum TableSlot {
    Empty,
    Tombstone,
    Occupied(Entry),
}

/// One table serves all frames; the scope-id discriminator lets two
/// variables of the same name in different frames coexist. The table
/// also owns the monotonically increasing scope counter frames draw
/// from.
#[derive(Debug)]
pub struct SymbolTable {
    slots: Vec<TableSlot>,
    size: usize,
    prime_index: usize,
    next_scope: usize,
}

impl SymbolTable {
    pub fn new() -> SymbolTable {
        SymbolTable {
            slots: (0..PRIMES[0]).map(|_| TableSlot::Empty).collect(),
            size: 0,
            prime_index: 0,
            next_scope: 0,
        }
    }

    pub fn fresh_scope(&mut self) -> usize {
        let scope = self.next_scope;
        self.next_scope += 1;
        scope
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Bind `key` in `scope`. Updating an existing binding displaces
    /// the old slot, which is handed back to the caller so it drops
    /// after the table borrow ends (a displaced closure may tear down
    /// a whole environment). Const bindings may be neither overwritten
    /// nor layered on top of an existing binding.
    pub fn set(
        &mut self,
        key: &str,
        scope: usize,
        value: Slot,
        is_const: bool,
    ) -> Result<Option<Slot>, BindError> {
        if key.len() > VARIABLE_MAX_LENGTH {
            return Err(BindError::NameTooLong(key.to_string()));
        }

        let (index, exists) = self.find_insert_slot(key, scope);
        if exists {
            let TableSlot::Occupied(entry) = &mut self.slots[index] else {
                unreachable!("insert probe reported an occupied slot");
            };
            if entry.is_const {
                return Err(BindError::AssignToConst(key.to_string()));
            }
            if is_const {
                return Err(BindError::ConstRedefine(key.to_string()));
            }
            Ok(Some(std::mem::replace(&mut entry.value, value)))
        } else {
            self.slots[index] = TableSlot::Occupied(Entry {
                key: key.to_string(),
                scope,
                value,
                is_const,
            });
            self.size += 1;
            self.ensure_load_factor();
            Ok(None)
        }
    }

    pub fn get(&self, key: &str, scope: usize) -> Option<(Slot, bool)> {
        let index = self.find(key, scope)?;
        match &self.slots[index] {
            TableSlot::Occupied(entry) => Some((entry.value.clone(), entry.is_const)),
            _ => None,
        }
    }

    pub fn contains(&self, key: &str, scope: usize) -> bool {
        self.find(key, scope).is_some()
    }

    pub fn remove(&mut self, key: &str, scope: usize) -> Option<Slot> {
        let index = self.find(key, scope)?;
        match std::mem::replace(&mut self.slots[index], TableSlot::Tombstone) {
            TableSlot::Occupied(entry) => {
                self.size -= 1;
                Some(entry.value)
            }
            other => {
                self.slots[index] = other;
                None
            }
        }
    }

    /// Tombstone every binding of a dying frame's scope. The released
    /// slots are returned so the caller can drop them outside the
    /// table borrow.
    pub fn remove_scope(&mut self, scope: usize) -> Vec<Slot> {
        let mut released = Vec::new();
        for slot in &mut self.slots {
            if matches!(slot, TableSlot::Occupied(entry) if entry.scope == scope) {
                if let TableSlot::Occupied(entry) =
                    std::mem::replace(slot, TableSlot::Tombstone)
                {
                    released.push(entry.value);
                    self.size -= 1;
                }
            }
        }
        released
    }

    fn hash(key: &str, scope: usize) -> usize {
        let h1 = djb2(key);
        let h2 = scope.wrapping_mul(0x9E37_79B9_7F4A_7C15);
        hash_combine(h1, h2)
    }

    /// Quadratic probe for an existing binding; an empty slot ends the
    /// search, tombstones are probed past.
    fn find(&self, key: &str, scope: usize) -> Option<usize> {
        let capacity = self.slots.len();
        let hash = SymbolTable::hash(key, scope);

        for i in 0..capacity {
            let index = (hash.wrapping_add(i * i)) % capacity;
            match &self.slots[index] {
                TableSlot::Empty => return None,
                TableSlot::Tombstone => {}
                TableSlot::Occupied(entry) => {
                    if entry.scope == scope && entry.key == key {
                        return Some(index);
                    }
                }
            }
        }
        None
    }

    /// Probe for the slot an insert should use: the existing binding's
    /// slot when present, otherwise the first reusable one.
    fn find_insert_slot(&self, key: &str, scope: usize) -> (usize, bool) {
        let capacity = self.slots.len();
        let hash = SymbolTable::hash(key, scope);
        let mut first_available = None;

        for i in 0..capacity {
            let index = (hash.wrapping_add(i * i)) % capacity;
            match &self.slots[index] {
                TableSlot::Empty => {
                    return (first_available.unwrap_or(index), false);
                }
                TableSlot::Tombstone => {
                    if first_available.is_none() {
                        first_available = Some(index);
                    }
                }
                TableSlot::Occupied(entry) => {
                    if entry.scope == scope && entry.key == key {
                        return (index, true);
                    }
                }
            }
        }
        (
            first_available.expect("symbol table kept below max load factor"),
            false,
        )
    }

    fn ensure_load_factor(&mut self) {
        let load_factor = self.size as f64 / self.slots.len() as f64;
        if load_factor > MAX_LOAD_FACTOR {
            self.resize();
        }
    }

    fn resize(&mut self) {
        self.prime_index = (self.prime_index + 1).min(PRIMES.len() - 1);
        let new_capacity = PRIMES[self.prime_index];

        let old = std::mem::replace(
            &mut self.slots,
            (0..new_capacity).map(|_| TableSlot::Empty).collect(),
        );

        for slot in old {
            if let TableSlot::Occupied(entry) = slot {
                let (index, _) = self.find_insert_slot(&entry.key, entry.scope);
                self.slots[index] = TableSlot::Occupied(entry);
            }
        }
    }

    /// Debug dump behind the --verbose flag.
    pub fn stats(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "HASH TABLE");
        let _ = writeln!(out, "SIZE: {}", self.size);
        let _ = writeln!(out, "CAPACITY: {}", self.slots.len());
        if self.size > 0 {
            let _ = writeln!(out, "\nVALUES:");
        }
        for (i, slot) in self.slots.iter().enumerate() {
            if let TableSlot::Occupied(entry) = slot {
                let _ = writeln!(
                    out,
                    "{i:3}: const: {}, scope: {}, key: {}",
                    entry.is_const as u8, entry.scope, entry.key
                );
            }
        }
        out
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        SymbolTable::new()
    }
}

const DJB2_SEED: usize = 5381;

fn djb2(key: &str) -> usize {
    let mut hash = DJB2_SEED;
    for b in key.bytes() {
        hash = ((hash << 5).wrapping_add(hash)) ^ (b as usize);
    }
    hash
}

fn hash_combine(h1: usize, h2: usize) -> usize {
    h1 ^ (h2
        .wrapping_add(0x9E37_79B9)
        .wrapping_add(h1 << 6)
        .wrapping_add(h1 >> 2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{new_slot, Value};

    fn slot(n: i64) -> Slot {
        new_slot(Value::Int(n))
    }

    fn get_int(table: &SymbolTable, key: &str, scope: usize) -> Option<i64> {
        table.get(key, scope).map(|(s, _)| match &*s.borrow() {
            Value::Int(n) => *n,
            other => panic!("expected int, got {other:?}"),
        })
    }

    #[test]
    fn test_set_and_get() {
        let mut table = SymbolTable::new();
        table.set("x", 0, slot(42), false).unwrap();
        assert_eq!(get_int(&table, "x", 0), Some(42));
        assert_eq!(table.get("x", 1).map(|_| ()), None);
        assert_eq!(table.get("y", 0).map(|_| ()), None);
    }

    #[test]
    fn test_same_name_different_scopes() {
        let mut table = SymbolTable::new();
        table.set("x", 0, slot(1), false).unwrap();
        table.set("x", 7, slot(2), false).unwrap();
        assert_eq!(get_int(&table, "x", 0), Some(1));
        assert_eq!(get_int(&table, "x", 7), Some(2));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_update_replaces_value() {
        let mut table = SymbolTable::new();
        table.set("x", 0, slot(1), false).unwrap();
        table.set("x", 0, slot(2), false).unwrap();
        assert_eq!(get_int(&table, "x", 0), Some(2));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_const_cannot_be_overwritten() {
        let mut table = SymbolTable::new();
        table.set("k", 0, slot(1), true).unwrap();
        assert!(matches!(
            table.set("k", 0, slot(2), false),
            Err(BindError::AssignToConst(_))
        ));
        assert_eq!(get_int(&table, "k", 0), Some(1));
    }

    #[test]
    fn test_const_cannot_layer_over_existing() {
        let mut table = SymbolTable::new();
        table.set("x", 0, slot(1), false).unwrap();
        assert!(matches!(
            table.set("x", 0, slot(2), true),
            Err(BindError::ConstRedefine(_))
        ));
    }

    #[test]
    fn test_name_length_bound() {
        let mut table = SymbolTable::new();
        let long = "a".repeat(VARIABLE_MAX_LENGTH + 1);
        assert!(matches!(
            table.set(&long, 0, slot(1), false),
            Err(BindError::NameTooLong(_))
        ));
        let max = "a".repeat(VARIABLE_MAX_LENGTH);
        assert!(table.set(&max, 0, slot(1), false).is_ok());
    }

    #[test]
    fn test_remove_leaves_tombstone_probing_intact() {
        let mut table = SymbolTable::new();
        // force a probe chain: many keys, then remove one in the middle
        for i in 0..40 {
            table.set(&format!("v{i}"), 0, slot(i), false).unwrap();
        }
        assert!(table.remove("v20", 0).is_some());
        assert!(!table.contains("v20", 0));
        // everything else still reachable despite tombstones
        for i in 0..40 {
            if i != 20 {
                assert_eq!(get_int(&table, &format!("v{i}"), 0), Some(i), "v{i}");
            }
        }
    }

    #[test]
    fn test_tombstone_slot_reused() {
        let mut table = SymbolTable::new();
        table.set("x", 0, slot(1), false).unwrap();
        assert!(table.remove("x", 0).is_some());
        table.set("x", 0, slot(2), false).unwrap();
        assert_eq!(get_int(&table, "x", 0), Some(2));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_rebuild_past_load_factor() {
        let mut table = SymbolTable::new();
        let initial_capacity = table.capacity();
        for i in 0..100 {
            table.set(&format!("k{i}"), i % 3, slot(i as i64), false).unwrap();
        }
        assert!(table.capacity() > initial_capacity);
        for i in 0..100 {
            assert_eq!(get_int(&table, &format!("k{i}"), i % 3), Some(i as i64));
        }
    }

    #[test]
    fn test_remove_scope_releases_only_that_scope() {
        let mut table = SymbolTable::new();
        table.set("a", 1, slot(1), false).unwrap();
        table.set("b", 1, slot(2), false).unwrap();
        table.set("a", 2, slot(3), false).unwrap();

        let released = table.remove_scope(1);
        assert_eq!(released.len(), 2);
        assert!(!table.contains("a", 1));
        assert!(!table.contains("b", 1));
        assert_eq!(get_int(&table, "a", 2), Some(3));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_fresh_scope_monotonic() {
        let mut table = SymbolTable::new();
        let a = table.fresh_scope();
        let b = table.fresh_scope();
        let c = table.fresh_scope();
        assert!(a < b && b < c);
    }

    #[test]
    fn test_stats_dump() {
        let mut table = SymbolTable::new();
        table.set("x", 0, slot(1), true).unwrap();
        let stats = table.stats();
        assert!(stats.contains("SIZE: 1"));
        assert!(stats.contains("key: x"));
    }
}
