use std::{borrow::Cow, collections::HashSet, sync::Arc};

use regex::Regex;

use crate::Key;

use super::{
    instrument::{Instrument, InstrumentKind},
    meter::validate_instrument_name,
    storage::{StreamDescriptor, DEFAULT_CARDINALITY_LIMIT},
    MetricError, MetricResult,
};

/// The aggregation applied to a stream selected by a [View].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum Aggregation {
    /// The default aggregation of the instrument kind: a sum for counters and
    /// up-down counters, the last value for gauges.
    #[default]
    Default,
    /// Measurements are dropped and nothing is reported.
    Drop,
}

/// Used to customize the metrics that are output by the provider.
///
/// A view selects instruments by name, kind and meter name, and describes the
/// stream produced for every instrument it selects. An instrument selected by
/// several views produces one stream per view. An instrument selected by no
/// view produces its default stream.
///
/// Here are some examples when a [View] might be needed:
///
/// * Drop instruments an application is not interested in.
/// * Rename an instrument, or replace its description.
/// * Keep only some of the attributes recorded on an instrument, to reduce
///   cardinality.
///
/// # Example
///
/// ```
/// use opentelemetry_metrics_core::metrics::{Aggregation, View};
///
/// let drop_debug = View::builder()
///     .with_instrument_name("debug.*")
///     .with_aggregation(Aggregation::Drop)
///     .build()
///     .unwrap();
///
/// let rename = View::builder()
///     .with_instrument_name("requests")
///     .with_stream_name("http.server.requests")
///     .build()
///     .unwrap();
/// # drop((drop_debug, rename));
/// ```
#[derive(Clone, Debug)]
pub struct View {
    instrument_name: Option<Regex>,
    instrument_kind: Option<InstrumentKind>,
    meter_name: Option<Cow<'static, str>>,
    stream_name: Option<Cow<'static, str>>,
    stream_description: Option<Cow<'static, str>>,
    allowed_attribute_keys: Option<Arc<HashSet<Key>>>,
    cardinality_limit: Option<usize>,
    aggregation: Aggregation,
}

impl View {
    /// Create a [ViewBuilder].
    pub fn builder() -> ViewBuilder {
        ViewBuilder::default()
    }

    fn matches(&self, instrument: &Instrument) -> bool {
        self.instrument_name
            .as_ref()
            .map_or(true, |re| re.is_match(&instrument.name.to_ascii_lowercase()))
            && self.instrument_kind.map_or(true, |kind| kind == instrument.kind)
            && self
                .meter_name
                .as_ref()
                .map_or(true, |name| name == instrument.scope.name())
    }

    fn stream(&self, instrument: &Instrument) -> Option<StreamDescriptor> {
        if self.aggregation == Aggregation::Drop {
            return None;
        }
        Some(StreamDescriptor {
            name: self
                .stream_name
                .clone()
                .unwrap_or_else(|| instrument.name.clone()),
            description: self
                .stream_description
                .clone()
                .unwrap_or_else(|| instrument.description.clone()),
            unit: instrument.unit.clone(),
            kind: instrument.kind,
            allowed_attribute_keys: self.allowed_attribute_keys.clone(),
            cardinality_limit: self
                .cardinality_limit
                .unwrap_or(DEFAULT_CARDINALITY_LIMIT),
        })
    }
}

/// Configuration for a [View].
#[derive(Debug, Default)]
pub struct ViewBuilder {
    instrument_name: Option<Cow<'static, str>>,
    instrument_kind: Option<InstrumentKind>,
    meter_name: Option<Cow<'static, str>>,
    stream_name: Option<Cow<'static, str>>,
    stream_description: Option<Cow<'static, str>>,
    allowed_attribute_keys: Option<Arc<HashSet<Key>>>,
    cardinality_limit: Option<usize>,
    aggregation: Aggregation,
}

impl ViewBuilder {
    /// Select instruments by name.
    ///
    /// Matching is case-insensitive. `*` matches any run of characters and
    /// `?` matches exactly one character.
    pub fn with_instrument_name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.instrument_name = Some(name.into());
        self
    }

    /// Select instruments by kind.
    pub fn with_instrument_kind(mut self, kind: InstrumentKind) -> Self {
        self.instrument_kind = Some(kind);
        self
    }

    /// Select instruments created by meters with this exact name.
    pub fn with_meter_name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.meter_name = Some(name.into());
        self
    }

    /// Rename the selected instrument.
    ///
    /// Only valid together with an instrument name selector without wildcards,
    /// since several instruments reporting under one name would conflict.
    pub fn with_stream_name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.stream_name = Some(name.into());
        self
    }

    /// Replace the description of the selected instruments.
    pub fn with_stream_description(mut self, description: impl Into<Cow<'static, str>>) -> Self {
        self.stream_description = Some(description.into());
        self
    }

    /// Keep only the attributes with these keys.
    ///
    /// An empty set drops all attributes.
    pub fn with_allowed_attribute_keys(mut self, keys: impl IntoIterator<Item = Key>) -> Self {
        self.allowed_attribute_keys = Some(Arc::new(keys.into_iter().collect()));
        self
    }

    /// Limit the number of distinct attribute sets tracked per stream.
    ///
    /// Measurements for attribute sets beyond the limit are reported under a
    /// single set holding only `otel.metric.overflow=true`. The empty
    /// attribute set does not count towards the limit. Defaults to 2000.
    pub fn with_cardinality_limit(mut self, limit: usize) -> Self {
        self.cardinality_limit = Some(limit);
        self
    }

    /// Set the aggregation of the selected instruments.
    pub fn with_aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = aggregation;
        self
    }

    /// Create the [View].
    ///
    /// # Errors
    ///
    /// Returns [MetricError::Config] if the view selects nothing, renames
    /// instruments selected by a wildcard or by kind only, or sets a zero
    /// cardinality limit, and
    /// [MetricError::InvalidInstrumentConfiguration] if the new name is not a
    /// valid instrument name.
    pub fn build(self) -> MetricResult<View> {
        if self.instrument_name.is_none()
            && self.instrument_kind.is_none()
            && self.meter_name.is_none()
        {
            return Err(MetricError::Config(
                "a view must select instruments by name, kind or meter name".into(),
            ));
        }

        if self.cardinality_limit == Some(0) {
            return Err(MetricError::Config(
                "the cardinality limit must be greater than zero".into(),
            ));
        }

        if let Some(stream_name) = &self.stream_name {
            let exact_name = self
                .instrument_name
                .as_ref()
                .is_some_and(|name| !name.contains(|c: char| c == '*' || c == '?'));
            if !exact_name {
                return Err(MetricError::Config(
                    "renaming a stream requires an instrument name selector without wildcards"
                        .into(),
                ));
            }
            validate_instrument_name(stream_name)?;
        }

        let instrument_name = self
            .instrument_name
            .as_deref()
            .map(wildcard_regex)
            .transpose()?;

        Ok(View {
            instrument_name,
            instrument_kind: self.instrument_kind,
            meter_name: self.meter_name,
            stream_name: self.stream_name,
            stream_description: self.stream_description,
            allowed_attribute_keys: self.allowed_attribute_keys,
            cardinality_limit: self.cardinality_limit,
            aggregation: self.aggregation,
        })
    }
}

fn wildcard_regex(pattern: &str) -> MetricResult<Regex> {
    let mut expr = String::with_capacity(pattern.len() + 2);
    expr.push('^');
    let mut buf = [0; 4];
    for c in pattern.to_ascii_lowercase().chars() {
        match c {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            c => expr.push_str(&regex::escape(c.encode_utf8(&mut buf))),
        }
    }
    expr.push('$');
    Regex::new(&expr)
        .map_err(|err| MetricError::Config(format!("invalid instrument name selector: {err}")))
}

/// The views configured on a provider.
#[derive(Debug, Default)]
pub(crate) struct ViewRegistry {
    views: Vec<View>,
}

impl ViewRegistry {
    pub(crate) fn new(views: Vec<View>) -> Self {
        ViewRegistry { views }
    }

    pub(crate) fn len(&self) -> usize {
        self.views.len()
    }

    /// Resolves the streams `instrument` records into.
    ///
    /// Views with [Aggregation::Drop] contribute no stream, so the result can
    /// be empty even though a view matched.
    pub(crate) fn find_streams(&self, instrument: &Instrument) -> Vec<StreamDescriptor> {
        let mut matched = false;
        let mut streams = Vec::new();
        for view in &self.views {
            if view.matches(instrument) {
                matched = true;
                streams.extend(view.stream(instrument));
            }
        }
        if !matched {
            streams.push(StreamDescriptor {
                name: instrument.name.clone(),
                description: instrument.description.clone(),
                unit: instrument.unit.clone(),
                kind: instrument.kind,
                allowed_attribute_keys: None,
                cardinality_limit: DEFAULT_CARDINALITY_LIMIT,
            });
        }
        streams
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InstrumentationScope;
    use rstest::rstest;

    fn instrument(name: &'static str, kind: InstrumentKind, meter: &'static str) -> Instrument {
        Instrument {
            name: name.into(),
            description: "desc".into(),
            kind,
            unit: "1".into(),
            scope: InstrumentationScope::builder(meter).build(),
        }
    }

    #[rstest]
    #[case("requests", "requests", true)]
    #[case("requests", "Requests", true)]
    #[case("http.*", "http.server.duration", true)]
    #[case("http.*", "grpc.server.duration", false)]
    #[case("request?", "requests", true)]
    #[case("request?", "request", false)]
    #[case("a.b", "axb", false)]
    fn name_selector(#[case] pattern: &'static str, #[case] name: &'static str, #[case] hit: bool) {
        let view = View::builder().with_instrument_name(pattern).build().unwrap();
        assert_eq!(
            view.matches(&instrument(name, InstrumentKind::Counter, "meter")),
            hit
        );
    }

    #[test]
    fn all_criteria_must_match() {
        let view = View::builder()
            .with_instrument_kind(InstrumentKind::Gauge)
            .with_meter_name("db")
            .build()
            .unwrap();
        assert!(view.matches(&instrument("x", InstrumentKind::Gauge, "db")));
        assert!(!view.matches(&instrument("x", InstrumentKind::Counter, "db")));
        assert!(!view.matches(&instrument("x", InstrumentKind::Gauge, "web")));
    }

    #[test]
    fn empty_selector_is_rejected() {
        assert!(matches!(
            View::builder().build(),
            Err(MetricError::Config(_))
        ));
    }

    #[rstest]
    #[case::wildcard(Some("http.*"))]
    #[case::kind_only(None)]
    fn rename_requires_exact_name(#[case] name: Option<&'static str>) {
        let mut builder = View::builder()
            .with_instrument_kind(InstrumentKind::Counter)
            .with_stream_name("renamed");
        if let Some(name) = name {
            builder = builder.with_instrument_name(name);
        }
        assert!(matches!(builder.build(), Err(MetricError::Config(_))));
    }

    #[test]
    fn rename_to_invalid_name_is_rejected() {
        let result = View::builder()
            .with_instrument_name("requests")
            .with_stream_name("1nvalid")
            .build();
        assert!(matches!(
            result,
            Err(MetricError::InvalidInstrumentConfiguration(_))
        ));
    }

    #[test]
    fn registry_resolves_streams() {
        let registry = ViewRegistry::new(vec![
            View::builder()
                .with_instrument_name("requests")
                .with_stream_name("renamed")
                .with_stream_description("new description")
                .build()
                .unwrap(),
            View::builder()
                .with_instrument_name("req*")
                .with_allowed_attribute_keys([Key::new("route")])
                .build()
                .unwrap(),
            View::builder()
                .with_instrument_name("noisy")
                .with_aggregation(Aggregation::Drop)
                .build()
                .unwrap(),
        ]);

        let streams = registry.find_streams(&instrument("requests", InstrumentKind::Counter, "m"));
        assert_eq!(streams.len(), 2);
        assert_eq!(streams[0].name, "renamed");
        assert_eq!(streams[0].description, "new description");
        assert_eq!(streams[1].name, "requests");
        assert!(streams[1]
            .allowed_attribute_keys
            .as_ref()
            .is_some_and(|keys| keys.contains(&Key::new("route"))));

        assert!(registry
            .find_streams(&instrument("noisy", InstrumentKind::Counter, "m"))
            .is_empty());

        let default = registry.find_streams(&instrument("other", InstrumentKind::Gauge, "m"));
        assert_eq!(default.len(), 1);
        assert_eq!(default[0].name, "other");
        assert_eq!(default[0].allowed_attribute_keys, None);
        assert_eq!(default[0].cardinality_limit, DEFAULT_CARDINALITY_LIMIT);
    }

    #[test]
    fn cardinality_limit_is_carried_to_the_stream() {
        let registry = ViewRegistry::new(vec![View::builder()
            .with_instrument_name("requests")
            .with_cardinality_limit(10)
            .build()
            .unwrap()]);
        let streams = registry.find_streams(&instrument("requests", InstrumentKind::Counter, "m"));
        assert_eq!(streams[0].cardinality_limit, 10);

        assert!(matches!(
            View::builder()
                .with_instrument_name("requests")
                .with_cardinality_limit(0)
                .build(),
            Err(MetricError::Config(_))
        ));
    }
}
