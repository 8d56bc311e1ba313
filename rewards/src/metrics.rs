// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use prometheus::{
    register_histogram_vec_with_registry, register_int_counter_vec_with_registry,
    register_int_counter_with_registry, register_int_gauge_with_registry, HistogramVec,
    IntCounter, IntCounterVec, IntGauge, Registry,
};

const FINE_GRAINED_LATENCY_SEC_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.05, 0.1, 0.15, 0.2, 0.25, 0.3, 0.35, 0.4, 0.45, 0.5, 0.6, 0.7, 0.8, 0.9,
    1.0, 1.2, 1.4, 1.6, 1.8, 2.0, 2.5, 3.0, 3.5, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10., 15., 20., 25.,
    30., 40., 50., 60., 90., 120.,
];

#[derive(Clone, Debug)]
pub struct RelayMetrics {
    pub(crate) eth_rpc_queries: IntCounterVec,
    pub(crate) eth_rpc_queries_latency: HistogramVec,
    pub(crate) eth_node_connected: IntGauge,

    pub(crate) submissions: IntCounterVec,
    pub(crate) submission_retries: IntCounter,
    pub(crate) submission_rejections: IntCounterVec,

    pub(crate) reconciled_records: IntCounterVec,
    pub(crate) dropped_logs: IntCounter,
}

impl RelayMetrics {
    pub fn new(registry: &Registry) -> Self {
        Self {
            eth_rpc_queries: register_int_counter_vec_with_registry!(
                "rewards_eth_rpc_queries",
                "Total number of queries issued to eth provider, by request type",
                &["method"],
                registry,
            )
            .unwrap(),
            eth_rpc_queries_latency: register_histogram_vec_with_registry!(
                "rewards_eth_rpc_queries_latency",
                "Latency of queries issued to eth provider, by request type",
                &["method"],
                FINE_GRAINED_LATENCY_SEC_BUCKETS.to_vec(),
                registry,
            )
            .unwrap(),
            eth_node_connected: register_int_gauge_with_registry!(
                "rewards_eth_node_connected",
                "Whether the last request to the eth node succeeded (1) or failed (0)",
                registry,
            )
            .unwrap(),
            submissions: register_int_counter_vec_with_registry!(
                "rewards_submissions",
                "Total number of finished submissions, by contract path and outcome",
                &["path", "outcome"],
                registry,
            )
            .unwrap(),
            submission_retries: register_int_counter_with_registry!(
                "rewards_submission_retries",
                "Total number of re-sent submissions after a traffic protection rejection",
                registry,
            )
            .unwrap(),
            submission_rejections: register_int_counter_vec_with_registry!(
                "rewards_submission_rejections",
                "Total number of submissions rejected before reaching the network, by reason",
                &["kind"],
                registry,
            )
            .unwrap(),
            reconciled_records: register_int_counter_vec_with_registry!(
                "rewards_reconciled_records",
                "Total number of submission records decoded from logs, by event schema",
                &["source"],
                registry,
            )
            .unwrap(),
            dropped_logs: register_int_counter_with_registry!(
                "rewards_dropped_logs",
                "Total number of logs no known event schema could decode",
                registry,
            )
            .unwrap(),
        }
    }

    pub fn new_for_testing() -> Self {
        let registry = Registry::new();
        Self::new(&registry)
    }
}
