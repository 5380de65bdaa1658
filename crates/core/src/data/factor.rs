use indexmap::IndexMap;

use crate::error::{MatvarError, Result};

/// Group labels attached one-to-one to the observations of a stack.
///
/// Levels are discovered in order of first appearance and assigned 0-based codes,
/// unless a level list is declared up front with [`GroupLabels::with_levels`].
/// Declared levels may have no observations; the discriminant builders drop
/// those groups with a warning.
#[derive(Debug, Clone)]
pub struct GroupLabels {
    /// Maps level string -> integer code (0-based), in level order.
    levels: IndexMap<String, usize>,
    /// The integer code of each observation.
    codes: Vec<usize>,
}

impl GroupLabels {
    /// Create labels from a slice of values; levels in order of first appearance.
    ///
    /// # Examples
    /// ```
    /// use matvar_core::data::GroupLabels;
    ///
    /// let g = GroupLabels::new(&["A", "B", "A", "C", "B"]);
    /// assert_eq!(g.n_levels(), 3);
    /// assert_eq!(g.codes(), &[0, 1, 0, 2, 1]);
    /// ```
    pub fn new<S: AsRef<str>>(values: &[S]) -> Self {
        let mut levels = IndexMap::new();
        let mut codes = Vec::with_capacity(values.len());

        for val in values {
            let next_code = levels.len();
            let code = *levels.entry(val.as_ref().to_string()).or_insert(next_code);
            codes.push(code);
        }

        GroupLabels { levels, codes }
    }

    /// Create labels against an explicit level list. Every value must be one
    /// of `levels`; levels without observations are kept (and counted as 0).
    pub fn with_levels<S: AsRef<str>, L: AsRef<str>>(values: &[S], levels: &[L]) -> Result<Self> {
        let mut level_map = IndexMap::new();
        for (code, level) in levels.iter().enumerate() {
            if level_map.insert(level.as_ref().to_string(), code).is_some() {
                return Err(MatvarError::Validation(format!(
                    "duplicate level '{}'",
                    level.as_ref()
                )));
            }
        }

        let codes = values
            .iter()
            .map(|v| {
                level_map.get(v.as_ref()).copied().ok_or_else(|| {
                    MatvarError::Validation(format!(
                        "label '{}' is not one of the declared levels",
                        v.as_ref()
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(GroupLabels {
            levels: level_map,
            codes,
        })
    }

    /// Returns the number of levels (including levels with no observations).
    pub fn n_levels(&self) -> usize {
        self.levels.len()
    }

    /// Returns the integer code of each observation.
    pub fn codes(&self) -> &[usize] {
        &self.codes
    }

    /// Returns the ordered level map (level name -> code).
    pub fn levels(&self) -> &IndexMap<String, usize> {
        &self.levels
    }

    /// Level names in code order.
    pub fn level_names(&self) -> Vec<String> {
        self.levels.keys().cloned().collect()
    }

    /// Returns the level name for a given code, or `None` if out of range.
    pub fn level_name(&self, code: usize) -> Option<&str> {
        self.levels.get_index(code).map(|(name, _)| name.as_str())
    }

    /// Number of observations in each level.
    pub fn counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.n_levels()];
        for &c in &self.codes {
            counts[c] += 1;
        }
        counts
    }

    /// Returns the number of observations.
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    /// Returns `true` if there are no observations.
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}
