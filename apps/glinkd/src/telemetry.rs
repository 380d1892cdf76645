// SPDX-FileCopyrightText: © 2025 Gibberlink Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Metrics provider setup.
//!
//! Installs an SDK meter provider so the gauges and counters scattered
//! through the gateway record somewhere. Export wiring (OTLP, Prometheus)
//! is a deployment concern layered on top of this provider.

use opentelemetry::global;
use opentelemetry_sdk::metrics::SdkMeterProvider;

/// Install the global meter provider. Returns it so the caller can shut it
/// down on exit.
pub fn init_metrics() -> SdkMeterProvider {
    let provider = SdkMeterProvider::builder().build();
    global::set_meter_provider(provider.clone());
    provider
}
