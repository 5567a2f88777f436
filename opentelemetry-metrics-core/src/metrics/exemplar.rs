/// Decides which measurements are offered as exemplars.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExemplarFilter {
    /// Every measurement is eligible; each time series keeps its latest one.
    AlwaysOn,
    /// No measurement is eligible.
    AlwaysOff,
    /// Only measurements recorded inside a sampled trace are eligible.
    ///
    /// Measurements carry no trace context here, so nothing is sampled.
    #[default]
    TraceBased,
}

impl ExemplarFilter {
    pub(crate) fn should_sample(&self) -> bool {
        matches!(self, ExemplarFilter::AlwaysOn)
    }
}
