use std::sync::Arc;

use crate::{Clock, Resource};

use super::{exemplar::ExemplarFilter, view::ViewRegistry};

/// State fixed at provider construction and shared by every meter and
/// producer of that provider.
#[derive(Debug)]
pub(crate) struct MeterProviderSharedState {
    clock: Arc<dyn Clock>,
    resource: Resource,
    view_registry: ViewRegistry,
    exemplar_filter: ExemplarFilter,
    start_epoch_nanos: u64,
}

impl MeterProviderSharedState {
    pub(crate) fn new(
        clock: Arc<dyn Clock>,
        resource: Resource,
        view_registry: ViewRegistry,
        exemplar_filter: ExemplarFilter,
    ) -> Self {
        let start_epoch_nanos = clock.now();
        MeterProviderSharedState {
            clock,
            resource,
            view_registry,
            exemplar_filter,
            start_epoch_nanos,
        }
    }

    pub(crate) fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub(crate) fn resource(&self) -> &Resource {
        &self.resource
    }

    pub(crate) fn view_registry(&self) -> &ViewRegistry {
        &self.view_registry
    }

    pub(crate) fn exemplar_filter(&self) -> ExemplarFilter {
        self.exemplar_filter
    }

    /// When the provider was built, in nanoseconds since the UNIX epoch.
    pub(crate) fn start_epoch_nanos(&self) -> u64 {
        self.start_epoch_nanos
    }
}
