use super::encoding::CodecError;
use super::varint::{put_str, put_uvarint, PayloadReader};
use fxhash::FxHashMap;

/// Key reserved for the empty string. Never assigned and never persisted.
pub const EMPTY_KEY: u64 = 0;

/// One dictionary entry as stored in a `StringId` record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntString {
    pub key: u64,
    pub value: String,
}

impl IntString {
    pub fn new(key: u64, value: impl Into<String>) -> Self {
        Self {
            key,
            value: value.into(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + self.value.len());
        put_uvarint(&mut out, self.key);
        put_str(&mut out, &self.value);
        out
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, CodecError> {
        let mut reader = PayloadReader::new(data);
        let key = reader.uvarint()?;
        let value = reader.str()?;
        reader.finish()?;
        Ok(Self { key, value })
    }
}

/// Outcome of [`StringIdMap::lookup_or_assign`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interned {
    /// The value already had a key
    Existing(u64),
    /// A key was just assigned; the caller must persist the entry
    Created(IntString),
}

impl Interned {
    pub fn key(&self) -> u64 {
        match self {
            Interned::Existing(key) => *key,
            Interned::Created(entry) => entry.key,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DictionaryError {
    #[error("Unknown dictionary key {0}")]
    UnknownKey(u64),

    #[error("Dictionary key 0 is reserved")]
    ReservedKey,

    #[error("Dictionary entry {0} has an empty value")]
    EmptyValue(u64),
}

/// Per-file string interning dictionary.
/// Maps strings to small integer keys so observation records only carry keys.
/// Owned by a single writer or a single reader, never shared.
#[derive(Debug)]
pub struct StringIdMap {
    /// String to key mapping (for encoding)
    string_to_key: FxHashMap<String, u64>,
    /// Key to string mapping (for decoding)
    key_to_string: FxHashMap<u64, String>,
    /// Next key to hand out
    next_key: u64,
}

impl StringIdMap {
    pub fn new() -> Self {
        Self {
            string_to_key: FxHashMap::default(),
            key_to_string: FxHashMap::default(),
            next_key: EMPTY_KEY + 1,
        }
    }

    /// Add one replayed entry
    pub fn append(&mut self, entry: IntString) -> Result<(), DictionaryError> {
        if entry.key == EMPTY_KEY {
            return Err(DictionaryError::ReservedKey);
        }
        if entry.value.is_empty() {
            return Err(DictionaryError::EmptyValue(entry.key));
        }
        self.bind(entry);
        Ok(())
    }

    fn bind(&mut self, entry: IntString) {
        if let Some(previous) = self.key_to_string.get(&entry.key) {
            // Last writer wins; drop the stale reverse binding if it still points here.
            if self.string_to_key.get(previous) == Some(&entry.key) {
                let previous = previous.clone();
                self.string_to_key.remove(&previous);
            }
        }
        self.next_key = self.next_key.max(entry.key.saturating_add(1));
        self.string_to_key.insert(entry.value.clone(), entry.key);
        self.key_to_string.insert(entry.key, entry.value);
    }

    /// Get the key for a string, assigning the next free key if it is new
    pub fn lookup_or_assign(&mut self, value: &str) -> Interned {
        if value.is_empty() {
            return Interned::Existing(EMPTY_KEY);
        }
        if let Some(key) = self.string_to_key.get(value) {
            return Interned::Existing(*key);
        }

        let entry = IntString::new(self.next_key, value);
        self.bind(entry.clone());
        Interned::Created(entry)
    }

    /// Marker for [`rollback`](Self::rollback): every key assigned after this call
    /// is at or above the returned value.
    pub fn checkpoint(&self) -> u64 {
        self.next_key
    }

    /// Forget every key assigned since `checkpoint`, so entries that never
    /// reached the file are assigned again on next use.
    pub fn rollback(&mut self, checkpoint: u64) {
        for key in checkpoint..self.next_key {
            if let Some(value) = self.key_to_string.remove(&key) {
                if self.string_to_key.get(&value) == Some(&key) {
                    self.string_to_key.remove(&value);
                }
            }
        }
        self.next_key = self.next_key.min(checkpoint.max(EMPTY_KEY + 1));
    }

    /// Look up the key for a string without assigning
    pub fn lookup(&self, value: &str) -> Option<u64> {
        if value.is_empty() {
            return Some(EMPTY_KEY);
        }
        self.string_to_key.get(value).copied()
    }

    pub fn resolve(&self, key: u64) -> Result<&str, DictionaryError> {
        if key == EMPTY_KEY {
            return Ok("");
        }
        self.key_to_string
            .get(&key)
            .map(|s| s.as_str())
            .ok_or(DictionaryError::UnknownKey(key))
    }

    /// Number of interned strings
    pub fn len(&self) -> usize {
        self.key_to_string.len()
    }

    pub fn is_empty(&self) -> bool {
        self.key_to_string.is_empty()
    }

    /// Estimate memory usage in bytes
    pub fn memory_usage(&self) -> usize {
        let string_bytes: usize = self.key_to_string.values().map(|s| 2 * s.capacity()).sum();
        let overhead = self.key_to_string.capacity()
            * (std::mem::size_of::<String>() + std::mem::size_of::<u64>())
            * 2;
        string_bytes + overhead
    }
}

impl Default for StringIdMap {
    fn default() -> Self {
        Self::new()
    }
}
