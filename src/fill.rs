use std::collections::HashMap;

use crate::error::FillError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FillPhase {
    Empty,
    Collecting,
    Complete,
}

/// Ordered slots, a cursor into them, and the answers collected so far.
///
/// Every slot before the cursor has a value; `rollback` is the only way to move the cursor
/// backwards and it forgets the value of the slot it returns to.
#[derive(Clone, Debug, Default)]
pub struct FillState {
    placeholders: Vec<String>,
    cursor: usize,
    values: HashMap<String, String>,
    loaded: bool,
}

impl FillState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn initialize(&mut self, placeholders: Vec<String>) {
        self.placeholders = placeholders;
        self.cursor = 0;
        self.values.clear();
        self.loaded = true;
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn phase(&self) -> FillPhase {
        if !self.loaded {
            FillPhase::Empty
        } else if self.is_complete() {
            FillPhase::Complete
        } else {
            FillPhase::Collecting
        }
    }

    pub fn is_complete(&self) -> bool {
        self.loaded && self.cursor == self.placeholders.len()
    }

    pub fn current_placeholder(&self) -> Result<&str, FillError> {
        match self.phase() {
            FillPhase::Collecting => Ok(self.placeholders[self.cursor].as_str()),
            _ => Err(FillError::NotCollecting),
        }
    }

    /// Binds `value` to the current slot and advances. Returns the slot that was filled.
    pub fn record_answer(&mut self, value: impl Into<String>) -> Result<&str, FillError> {
        if self.phase() != FillPhase::Collecting {
            return Err(FillError::NotCollecting);
        }
        let idx = self.cursor;
        self.values
            .insert(self.placeholders[idx].clone(), value.into());
        self.cursor += 1;
        Ok(self.placeholders[idx].as_str())
    }

    /// Undoes the last `record_answer`: the cursor steps back and that slot's value is dropped.
    pub fn rollback(&mut self) -> Result<&str, FillError> {
        if !self.loaded || self.cursor == 0 {
            return Err(FillError::NothingToRollback);
        }
        self.cursor -= 1;
        let slot = self.placeholders[self.cursor].as_str();
        self.values.remove(slot);
        Ok(slot)
    }

    /// Overwrites an already-filled slot. Cursor and phase are unaffected.
    pub fn edit(&mut self, placeholder: &str, value: impl Into<String>) -> Result<(), FillError> {
        match self.values.get_mut(placeholder) {
            Some(slot) => {
                *slot = value.into();
                Ok(())
            }
            None => Err(FillError::EditOutOfRange(placeholder.to_string())),
        }
    }

    /// `(filled, total)`.
    pub fn progress(&self) -> (usize, usize) {
        (self.values.len(), self.placeholders.len())
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn placeholders(&self) -> &[String] {
        &self.placeholders
    }

    pub fn values(&self) -> &HashMap<String, String> {
        &self.values
    }

    pub fn value_of(&self, placeholder: &str) -> Option<&str> {
        self.values.get(placeholder).map(String::as_str)
    }

    /// Filled entries in placeholder order.
    pub fn filled_entries(&self) -> Vec<(&str, &str)> {
        self.placeholders
            .iter()
            .filter_map(|p| self.values.get(p).map(|v| (p.as_str(), v.as_str())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{FillPhase, FillState};
    use crate::error::FillError;

    fn loaded(slots: &[&str]) -> FillState {
        let mut st = FillState::new();
        st.initialize(slots.iter().map(|s| s.to_string()).collect());
        st
    }

    #[test]
    fn starts_empty() {
        let st = FillState::new();
        assert_eq!(st.phase(), FillPhase::Empty);
        assert!(!st.is_complete());
        assert_eq!(st.current_placeholder(), Err(FillError::NotCollecting));
    }

    #[test]
    fn n_answers_complete_n_slots() {
        let mut st = loaded(&["{A}", "{B}", "[C]"]);
        assert_eq!(st.phase(), FillPhase::Collecting);
        for (i, v) in ["a", "b", "c"].iter().enumerate() {
            assert_eq!(st.progress(), (i, 3));
            st.record_answer(*v).expect("record");
        }
        assert_eq!(st.phase(), FillPhase::Complete);
        assert_eq!(st.progress(), (3, 3));
        assert_eq!(st.record_answer("extra"), Err(FillError::NotCollecting));
    }

    #[test]
    fn empty_list_is_immediately_complete() {
        let st = loaded(&[]);
        assert_eq!(st.phase(), FillPhase::Complete);
        assert_eq!(st.progress(), (0, 0));
    }

    #[test]
    fn rollback_restores_current_slot() {
        let mut st = loaded(&["{A}", "{B}"]);
        st.record_answer("a").expect("a");
        assert_eq!(st.current_placeholder(), Ok("{B}"));
        st.record_answer("b").expect("b");
        assert_eq!(st.rollback(), Ok("{B}"));
        assert_eq!(st.current_placeholder(), Ok("{B}"));
        assert_eq!(st.value_of("{B}"), None);
        assert_eq!(st.value_of("{A}"), Some("a"));
        assert_eq!(st.progress(), (1, 2));
    }

    #[test]
    fn rollback_without_answer_is_rejected() {
        let mut st = loaded(&["{A}"]);
        assert_eq!(st.rollback(), Err(FillError::NothingToRollback));
        assert_eq!(st.cursor(), 0);
    }

    #[test]
    fn edit_touches_only_its_entry() {
        let mut st = loaded(&["{A}", "{B}", "{C}"]);
        st.record_answer("a").expect("a");
        st.record_answer("b").expect("b");
        st.edit("{A}", "alpha").expect("edit");
        assert_eq!(st.value_of("{A}"), Some("alpha"));
        assert_eq!(st.value_of("{B}"), Some("b"));
        assert_eq!(st.cursor(), 2);
        assert_eq!(st.progress(), (2, 3));
    }

    #[test]
    fn edit_of_unfilled_slot_is_rejected() {
        let mut st = loaded(&["{A}", "{B}"]);
        st.record_answer("a").expect("a");
        assert_eq!(
            st.edit("{B}", "x"),
            Err(FillError::EditOutOfRange("{B}".to_string()))
        );
        assert_eq!(st.progress(), (1, 2));
    }

    #[test]
    fn filled_entries_follow_placeholder_order() {
        let mut st = loaded(&["{Z}", "{A}", "{M}"]);
        st.record_answer("z").expect("z");
        st.record_answer("a").expect("a");
        assert_eq!(st.filled_entries(), vec![("{Z}", "z"), ("{A}", "a")]);
    }
}
