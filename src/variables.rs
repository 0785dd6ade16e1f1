use crate::operand::Operand;
use crate::EvalError;
use std::collections::HashMap;

/// A flat name -> Operand scope.
///
/// Key comparison is case-insensitive (keys are normalized to lowercase on
/// the way in) and insertion order is irrelevant. Keys are write-once:
/// re-adding an existing name through `insert` is an error. Names like
/// `foo.bar` and `foo[3]` are ordinary flat keys containing literal `.`,
/// `[` and `]` characters, not structural paths.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableTable {
    entries: HashMap<String, Operand>,
}

impl VariableTable {
    pub fn new() -> Self {
        VariableTable {
            entries: HashMap::new(),
        }
    }

    /// Add a new entry. Fails if the name (case-insensitively) exists.
    pub fn insert(&mut self, name: &str, value: Operand) -> Result<(), EvalError> {
        let key = name.to_lowercase();
        if self.entries.contains_key(&key) {
            return Err(EvalError::SyntaxError(format!(
                "variable '{}' is already defined",
                name
            )));
        }
        self.entries.insert(key, value);
        Ok(())
    }

    /// Set an entry, overwriting any existing one. Only call-local table
    /// construction needs this (reference parameters let local entries
    /// shadow global ones under the same aliased key).
    pub(crate) fn define(&mut self, name: &str, value: Operand) {
        self.entries.insert(name.to_lowercase(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Operand> {
        self.entries.get(&name.to_lowercase())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries; keys are the normalized (lowercase) forms.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Operand)> {
        self.entries.iter()
    }

    /// Entries whose key starts with `prefix` (which must already be
    /// lowercase). Used by the reference-parameter binding to alias whole
    /// name families into a call scope.
    pub(crate) fn entries_with_prefix<'a>(
        &'a self,
        prefix: &'a str,
    ) -> impl Iterator<Item = (&'a String, &'a Operand)> {
        self.entries
            .iter()
            .filter(move |(key, _)| key.starts_with(prefix))
    }

    /// Copy every entry of `other` into this table, write-once semantics.
    pub fn merge(&mut self, other: &VariableTable) -> Result<(), EvalError> {
        for (name, value) in other.iter() {
            self.insert(name, value.clone())?;
        }
        Ok(())
    }
}

/// The process-wide global scope: populated once at startup, read-only
/// afterwards. Preloads the two Boolean names.
pub fn create_global_table() -> VariableTable {
    let mut table = VariableTable::new();
    table.define("true", Operand::TRUE);
    table.define("false", Operand::FALSE);
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let mut table = VariableTable::new();
        table.insert("FirstVar", Operand::Integer(34)).unwrap();
        assert_eq!(table.get("firstvar"), Some(&Operand::Integer(34)));
        assert_eq!(table.get("FIRSTVAR"), Some(&Operand::Integer(34)));
        assert!(table.contains("fIrStVaR"));
        assert_eq!(table.get("other"), None);
    }

    #[test]
    fn test_keys_are_write_once() {
        let mut table = VariableTable::new();
        table.insert("x", Operand::Integer(1)).unwrap();
        assert!(table.insert("x", Operand::Integer(2)).is_err());
        assert!(table.insert("X", Operand::Integer(2)).is_err());
        assert_eq!(table.get("x"), Some(&Operand::Integer(1)));
    }

    #[test]
    fn test_composite_keys_are_plain_strings() {
        let mut table = VariableTable::new();
        table.insert("b[0]", Operand::Integer(234)).unwrap();
        table.insert("b.length", Operand::Integer(1)).unwrap();
        assert_eq!(table.get("B[0]"), Some(&Operand::Integer(234)));
        assert_eq!(table.get("b.LENGTH"), Some(&Operand::Integer(1)));
    }

    #[test]
    fn test_prefix_iteration() {
        let mut table = VariableTable::new();
        table.insert("xyz", Operand::Integer(-123)).unwrap();
        table.insert("xyz.subname", Operand::Integer(-340)).unwrap();
        table.insert("other", Operand::Integer(0)).unwrap();
        let mut keys: Vec<&String> = table.entries_with_prefix("xyz").map(|(k, _)| k).collect();
        keys.sort();
        assert_eq!(keys, vec!["xyz", "xyz.subname"]);
    }

    #[test]
    fn test_global_table_booleans() {
        let globals = create_global_table();
        assert_eq!(globals.get("true"), Some(&Operand::TRUE));
        assert_eq!(globals.get("False"), Some(&Operand::FALSE));
    }

    #[test]
    fn test_merge_respects_write_once() {
        let mut a = VariableTable::new();
        a.insert("x", Operand::Integer(1)).unwrap();
        let mut b = VariableTable::new();
        b.insert("y", Operand::Integer(2)).unwrap();
        a.merge(&b).unwrap();
        assert_eq!(a.get("y"), Some(&Operand::Integer(2)));
        assert!(a.merge(&b).is_err());
    }
}
