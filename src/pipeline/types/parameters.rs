use indexmap::IndexSet;
use tracing::warn;

pub const MIN_THRESHOLD: f32 = 0.1;
pub const MAX_THRESHOLD: f32 = 0.9;

/// Labels the service should restrict detection to. Empty means no filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassFilter {
    labels: IndexSet<String>,
}

impl ClassFilter {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_unfiltered(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.contains(label)
    }

    /// Adds the label if absent, removes it otherwise. Returns true when the
    /// label is selected afterwards.
    pub fn toggle(&mut self, label: &str) -> bool {
        if self.labels.shift_remove(label) {
            false
        } else {
            self.labels.insert(label.to_string());
            true
        }
    }

    /// Wire form: `None` when nothing is selected.
    pub fn to_wire(&self) -> Option<Vec<String>> {
        if self.is_unfiltered() {
            None
        } else {
            Some(self.labels.iter().cloned().collect())
        }
    }
}

impl<S: Into<String>> FromIterator<S> for ClassFilter {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            labels: iter.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectionParameters {
    threshold: f32,
    class_filter: ClassFilter,
}

impl Default for DetectionParameters {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            class_filter: ClassFilter::none(),
        }
    }
}

impl DetectionParameters {
    pub fn new(threshold: f32, class_filter: ClassFilter) -> Self {
        let mut parameters = Self {
            class_filter,
            ..Self::default()
        };
        parameters.set_threshold(threshold);
        parameters
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn class_filter(&self) -> &ClassFilter {
        &self.class_filter
    }

    pub fn class_filter_mut(&mut self) -> &mut ClassFilter {
        &mut self.class_filter
    }

    /// Clamps into `[MIN_THRESHOLD, MAX_THRESHOLD]`; non-finite values are ignored.
    pub fn set_threshold(&mut self, threshold: f32) -> f32 {
        if threshold.is_finite() {
            self.threshold = threshold.clamp(MIN_THRESHOLD, MAX_THRESHOLD);
        } else {
            warn!("Ignoring non-finite threshold {}", threshold);
        }
        self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_is_clamped() {
        let mut parameters = DetectionParameters::default();
        assert_eq!(parameters.set_threshold(0.05), MIN_THRESHOLD);
        assert_eq!(parameters.set_threshold(1.5), MAX_THRESHOLD);
        assert_eq!(parameters.set_threshold(0.35), 0.35);
        assert_eq!(parameters.set_threshold(f32::NAN), 0.35);
    }

    #[test]
    fn toggling_keeps_selection_order() {
        let mut filter: ClassFilter = ["person", "car"].into_iter().collect();
        assert!(filter.toggle("dog"));
        assert!(!filter.toggle("person"));
        assert!(filter.toggle("person"));
        assert_eq!(
            filter.to_wire(),
            Some(vec!["car".to_string(), "dog".to_string(), "person".to_string()])
        );
    }

    #[test]
    fn empty_filter_goes_out_as_null() {
        let mut filter: ClassFilter = ["person"].into_iter().collect();
        filter.toggle("person");
        assert!(filter.is_unfiltered());
        assert_eq!(filter.to_wire(), None);
    }
}
