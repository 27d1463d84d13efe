use crate::value::{ObjString, Value};
use std::rc::Rc;

const MAX_LOAD: f64 = 0.75;

struct Entry {
    key: Option<Rc<ObjString>>,
    value: Value,
}

impl Entry {
    fn empty() -> Self {
        Self {
            key: None,
            value: Value::Nil,
        }
    }

    fn is_tombstone(&self) -> bool {
        self.key.is_none() && !matches!(self.value, Value::Nil)
    }
}

/// Open-addressed hash table keyed by interned-string identity, with
/// tombstone deletion — grounded on `original_source/clox/table.c`.
/// Backs both the VM's globals environment and its string-interning
/// pool.
pub struct Table {
    entries: Vec<Entry>,
    count: usize,
}

impl Table {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            count: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Linear probe starting at `key.hash % capacity`. Returns the
    /// first tombstone seen, or the exact match, or the terminating
    /// empty slot — never loops forever because the table is always
    /// kept below `MAX_LOAD` capacity.
    fn find_entry(entries: &[Entry], key: &Rc<ObjString>) -> usize {
        let capacity = entries.len();
        let mut index = (key.hash as usize) % capacity;
        let mut tombstone: Option<usize> = None;

        loop {
            let entry = &entries[index];
            match &entry.key {
                None if entry.is_tombstone() => {
                    if tombstone.is_none() {
                        tombstone = Some(index);
                    }
                }
                None => return tombstone.unwrap_or(index),
                Some(k) if Rc::ptr_eq(k, key) => return index,
                Some(_) => {}
            }
            index = (index + 1) % capacity;
        }
    }

    fn adjust_capacity(&mut self, capacity: usize) {
        let mut entries = Vec::with_capacity(capacity);
        entries.resize_with(capacity, Entry::empty);

        let mut count = 0;
        for entry in self.entries.drain(..) {
            if let Some(key) = entry.key {
                let index = Self::find_entry(&entries, &key);
                entries[index] = Entry {
                    key: Some(key),
                    value: entry.value,
                };
                count += 1;
            }
        }

        self.entries = entries;
        self.count = count;
    }

    pub fn get(&self, key: &Rc<ObjString>) -> Option<&Value> {
        if self.count == 0 {
            return None;
        }
        let index = Self::find_entry(&self.entries, key);
        self.entries[index].key.as_ref()?;
        Some(&self.entries[index].value)
    }

    /// Returns `true` if this created a brand-new key (as opposed to
    /// overwriting one that already existed).
    pub fn set(&mut self, key: Rc<ObjString>, value: Value) -> bool {
        if self.count + 1 > (self.capacity() as f64 * MAX_LOAD) as usize {
            let new_capacity = if self.capacity() < 8 {
                8
            } else {
                self.capacity() * 2
            };
            self.adjust_capacity(new_capacity);
        }

        let index = Self::find_entry(&self.entries, &key);
        let is_new_key = self.entries[index].key.is_none();
        if is_new_key && !self.entries[index].is_tombstone() {
            self.count += 1;
        }

        self.entries[index] = Entry {
            key: Some(key),
            value,
        };
        is_new_key
    }

    pub fn delete(&mut self, key: &Rc<ObjString>) -> bool {
        if self.count == 0 {
            return false;
        }
        let index = Self::find_entry(&self.entries, key);
        if self.entries[index].key.is_none() {
            return false;
        }

        self.entries[index] = Entry {
            key: None,
            value: Value::Bool(true),
        };
        true
    }

    /// Looks a string object up by content rather than identity —
    /// the routine every interning path funnels through, since before
    /// interning there is no existing `Rc` to compare by pointer.
    /// Grounded on `tableFindString` in `table.c`.
    pub fn find_string(&self, chars: &str, hash: u32) -> Option<Rc<ObjString>> {
        if self.count == 0 {
            return None;
        }

        let capacity = self.capacity();
        let mut index = (hash as usize) % capacity;
        loop {
            let entry = &self.entries[index];
            match &entry.key {
                None if !entry.is_tombstone() => return None,
                Some(k) if k.hash == hash && k.chars == chars => return Some(Rc::clone(k)),
                _ => {}
            }
            index = (index + 1) % capacity;
        }
    }
}

impl Default for Table {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> Rc<ObjString> {
        Rc::new(ObjString::new(s.to_string()))
    }

    #[test]
    fn set_then_get_round_trips() {
        let mut table = Table::new();
        let k = key("a");
        assert!(table.set(Rc::clone(&k), Value::Number(1.0)));
        assert_eq!(table.get(&k), Some(&Value::Number(1.0)));
    }

    #[test]
    fn redefining_a_key_does_not_grow_count() {
        let mut table = Table::new();
        let k = key("a");
        table.set(Rc::clone(&k), Value::Number(1.0));
        assert!(!table.set(Rc::clone(&k), Value::Number(2.0)));
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(&k), Some(&Value::Number(2.0)));
    }

    #[test]
    fn delete_leaves_a_tombstone_that_does_not_stop_further_probing() {
        let mut table = Table::new();
        let a = key("a");
        let b = key("b");
        table.set(Rc::clone(&a), Value::Number(1.0));
        table.set(Rc::clone(&b), Value::Number(2.0));
        assert!(table.delete(&a));
        // `b` must still be reachable even though its probe chain may
        // pass through `a`'s now-tombstoned slot.
        assert_eq!(table.get(&b), Some(&Value::Number(2.0)));
        assert_eq!(table.get(&a), None);
    }

    #[test]
    fn reinserting_into_a_tombstone_does_not_increment_count() {
        let mut table = Table::new();
        let a = key("a");
        table.set(Rc::clone(&a), Value::Number(1.0));
        table.delete(&a);
        let before = table.len();
        table.set(Rc::clone(&a), Value::Number(3.0));
        assert_eq!(table.len(), before);
    }

    #[test]
    fn find_string_matches_by_content_and_hash() {
        let mut table = Table::new();
        let k = key("hello");
        let hash = k.hash;
        table.set(k, Value::Nil);
        let found = table.find_string("hello", hash);
        assert!(found.is_some());
        assert_eq!(found.unwrap().chars, "hello");
        assert!(table.find_string("nope", hash).is_none());
    }

    #[test]
    fn grows_past_many_insertions() {
        let mut table = Table::new();
        let keys: Vec<_> = (0..200).map(|i| key(&format!("k{i}"))).collect();
        for (i, k) in keys.iter().enumerate() {
            table.set(Rc::clone(k), Value::Number(i as f64));
        }
        assert_eq!(table.len(), 200);
        for k in &keys {
            assert!(table.get(k).is_some());
        }
    }
}
