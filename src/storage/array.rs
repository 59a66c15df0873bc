//! Array helpers
//!
//! push/pop/shift/unshift/slice on values stored as JSON arrays. Mutating
//! helpers read the current array (absent → empty), apply the change to a
//! local copy and write the whole array back with `WriteOrigin::Internal`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{KvError, Result};

use super::{ShardStore, WriteOrigin};

/// Result of push/pop/shift/unshift
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayOutcome {
    /// Array length after the operation
    pub length: usize,

    /// The element pushed/unshifted, or the one popped/shifted
    /// (`None` when popping/shifting an empty array)
    pub element: Option<Value>,
}

impl ShardStore {
    /// Append `value` to the array at `key`
    pub fn push(&mut self, key: &str, value: Value) -> Result<ArrayOutcome> {
        self.mutate_array(key, |array| {
            array.push(value.clone());
            Some(value)
        })
    }

    /// Remove the last element of the array at `key`
    pub fn pop(&mut self, key: &str) -> Result<ArrayOutcome> {
        self.mutate_array(key, Vec::pop)
    }

    /// Remove the first element of the array at `key`
    pub fn shift(&mut self, key: &str) -> Result<ArrayOutcome> {
        self.mutate_array(key, |array| {
            if array.is_empty() {
                None
            } else {
                Some(array.remove(0))
            }
        })
    }

    /// Prepend `value` to the array at `key`
    pub fn unshift(&mut self, key: &str, value: Value) -> Result<ArrayOutcome> {
        self.mutate_array(key, |array| {
            array.insert(0, value.clone());
            Some(value)
        })
    }

    /// Copy `[start, end)` out of the array at `key`.
    ///
    /// Negative indices count from the end. Returns `None` if the key is absent.
    pub fn slice(&self, key: &str, start: i64, end: Option<i64>) -> Result<Option<Vec<Value>>> {
        let Some(value) = self.get(key) else {
            return Ok(None);
        };
        let array = value.as_array().ok_or_else(|| not_an_array(key))?;

        let len = array.len();
        let from = resolve_index(start, len);
        let to = end.map_or(len, |end| resolve_index(end, len));

        if from >= to {
            return Ok(Some(Vec::new()));
        }
        Ok(Some(array[from..to].to_vec()))
    }

    fn mutate_array<F>(&mut self, key: &str, op: F) -> Result<ArrayOutcome>
    where
        F: FnOnce(&mut Vec<Value>) -> Option<Value>,
    {
        let mut array = match self.get(key) {
            None => Vec::new(),
            Some(Value::Array(items)) => items.clone(),
            Some(_) => return Err(not_an_array(key)),
        };

        let element = op(&mut array);
        let length = array.len();

        self.set(key, Value::Array(array), WriteOrigin::Internal);

        Ok(ArrayOutcome { length, element })
    }
}

fn not_an_array(key: &str) -> KvError {
    KvError::NotAnArray {
        key: key.to_string(),
    }
}

/// Clamp a possibly negative index into `0..=len`
fn resolve_index(index: i64, len: usize) -> usize {
    let len = i64::try_from(len).unwrap_or(i64::MAX);
    let resolved = if index < 0 {
        (len + index).max(0)
    } else {
        index.min(len)
    };
    resolved as usize
}
