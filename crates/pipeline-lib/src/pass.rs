//! Reconciliation pass
//!
//! A pass owns the build input and the status accumulator. It may build
//! the pipeline for one or both topologies, then drains the accumulated
//! status exactly once through [`ReconcilePass::finish`].

use crate::error::Result;
use crate::merge::{all_target_filters, audit_slice_subnets, compose_filters, merge_labels};
use crate::metrics::{builtin_definitions, merge_metrics};
use crate::models::BuildInput;
use crate::observability::{CompilerMetrics, StructuredLogger};
use crate::pipeline::split::workload_name;
use crate::pipeline::{build, digest, split, DynamicConfig, PipelineConfig, StaticConfig, Topology};
use crate::status::{ResourceKey, StatusAccumulator, StatusReport, StatusSink};
use std::time::Instant;

/// Everything the deployment side needs from one build
#[derive(Debug, Clone)]
pub struct CompiledPipeline {
    pub topology: Topology,
    pub config: PipelineConfig,
    pub static_config: StaticConfig,
    pub dynamic_config: DynamicConfig,
    pub digest: String,
}

impl CompiledPipeline {
    pub fn workload_name(&self) -> &'static str {
        workload_name(self.topology)
    }
}

pub struct ReconcilePass {
    input: BuildInput,
    status: StatusAccumulator,
    metrics: CompilerMetrics,
    logger: StructuredLogger,
}

impl ReconcilePass {
    pub fn new(input: BuildInput) -> Self {
        let mut status = StatusAccumulator::new();
        status.reset();
        let logger = StructuredLogger::new(&input.spec.namespace);
        Self {
            input,
            status,
            metrics: CompilerMetrics::new(),
            logger,
        }
    }

    pub fn input(&self) -> &BuildInput {
        &self.input
    }

    /// Status recorded so far, before the pass is finished
    pub fn status(&self) -> &StatusAccumulator {
        &self.status
    }

    /// Compile the pipeline for `topology`. On error nothing is returned,
    /// while conditions recorded before the failure stay in the accumulator.
    pub fn build(&mut self, topology: Topology) -> Result<CompiledPipeline> {
        let started = Instant::now();
        self.metrics.inc_builds();
        self.logger.log_build_started(
            topology.as_str(),
            self.input.flow_metrics.len(),
            self.input.slices.len(),
        );

        match self.compile(topology) {
            Ok(compiled) => {
                let elapsed = started.elapsed().as_secs_f64();
                self.metrics.observe_build_latency(elapsed);
                self.metrics.set_stages_generated(compiled.config.stages.len());
                self.logger.log_build_completed(
                    topology.as_str(),
                    compiled.config.stages.len(),
                    self.merged_metric_count(&compiled),
                    compiled.dynamic_config.parameters.len(),
                    &compiled.digest,
                    elapsed,
                );
                Ok(compiled)
            }
            Err(err) => {
                self.metrics.inc_build_failures();
                self.logger
                    .log_build_failed(topology.as_str(), &err.to_string(), err.is_internal());
                Err(err)
            }
        }
    }

    fn compile(&mut self, topology: Topology) -> Result<CompiledPipeline> {
        let input = &self.input;
        let spec = &input.spec;
        let slices_enabled = spec.slices_enabled();

        if slices_enabled {
            audit_slice_subnets(
                &spec.processor.subnet_labels.custom_labels,
                &input.slices,
                &mut self.status,
            )?;
        }

        let labels = merge_labels(
            &spec.processor.subnet_labels.custom_labels,
            &input.slices,
            slices_enabled,
            &input.detected_subnets,
        )?;

        let metrics = merge_metrics(
            &builtin_definitions(spec),
            &input.flow_metrics,
            &input.slices,
            slices_enabled,
            &mut self.status,
        )?;
        self.metrics.set_metrics_merged(metrics.len());

        let filters = all_target_filters(spec, compose_filters(spec, &input.slices, &mut self.status));
        let config = build(spec, topology, &metrics, &labels, &filters, input.cluster_name())?;

        let (static_params, dynamic_params) = split(&config);
        let static_config = StaticConfig::new(spec, topology, &config, static_params);
        let digest = digest(&static_config)?;

        self.report_resources();

        Ok(CompiledPipeline {
            topology,
            config,
            static_config,
            dynamic_config: DynamicConfig {
                parameters: dynamic_params,
            },
            digest,
        })
    }

    // Log what the merge recorded for each resource
    fn report_resources(&self) {
        for fm in &self.input.flow_metrics {
            let key = ResourceKey::new(&fm.namespace, &fm.name);
            let Some(status) = self.status.metric(&key) else {
                continue;
            };
            if let Some(ready) = status.ready.as_ref().filter(|c| !c.is_true()) {
                self.logger.log_custom_metric_failure(&key.to_string(), &ready.message);
            }
            if let Some(card) = status.cardinality.as_ref().filter(|c| c.is_true()) {
                self.logger
                    .log_cardinality_warning(&key.to_string(), &card.reason, &card.message);
            }
        }

        for slice in &self.input.slices {
            let key = ResourceKey::new(&slice.namespace, &slice.name);
            if let Some(warning) = self
                .status
                .slice(&key)
                .and_then(|s| s.subnet_warning.as_ref())
            {
                self.logger.log_subnet_warning(&key.to_string(), &warning.message);
            }
        }
    }

    fn merged_metric_count(&self, compiled: &CompiledPipeline) -> usize {
        compiled
            .config
            .parameters
            .iter()
            .filter_map(|p| p.encode.as_ref().and_then(|e| e.prom.as_ref()))
            .map(|prom| prom.metrics.len())
            .sum()
    }

    /// Drain the accumulated status into `sink`, ending the pass
    pub fn finish(mut self, sink: &mut dyn StatusSink) -> StatusReport {
        let report = self.status.drain();
        self.metrics.add_custom_metric_failures(report.failed_metrics());
        self.metrics.set_cardinality_warnings(report.cardinality_warnings());
        sink.publish(&report);
        self.logger
            .log_status_published(report.metrics.len(), report.slices.len());
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FlowMetric, FlowMetricSpec, NamespaceSlice, SubnetLabel};
    use crate::status::MemoryStatusSink;
    use pretty_assertions::assert_eq;

    fn custom_metric(name: &str, labels: &[&str]) -> FlowMetric {
        FlowMetric {
            name: name.to_string(),
            namespace: "netobserv".to_string(),
            spec: FlowMetricSpec {
                labels: labels.iter().map(|l| l.to_string()).collect(),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_build_returns_all_documents() {
        let mut pass = ReconcilePass::new(BuildInput::default());
        let compiled = pass.build(Topology::Direct).unwrap();
        assert_eq!(compiled.workload_name(), "flowlogs-pipeline");
        assert_eq!(compiled.static_config.pipeline, compiled.config.stages);
        assert_eq!(compiled.dynamic_config.parameters.len(), 1);
        assert_eq!(compiled.dynamic_config.parameters[0].name, "prometheus");
        assert_eq!(compiled.digest, digest(&compiled.static_config).unwrap());
    }

    #[test]
    fn test_status_is_drained_once_after_both_topologies() {
        let mut input = BuildInput::default();
        input.spec.kafka.address = "kafka:9092".to_string();
        input.spec.kafka.topic = "flows".to_string();
        input.flow_metrics = vec![
            custom_metric("by-pod", &["SrcK8S_Name"]),
            custom_metric("by-ip", &["SrcAddr"]),
        ];

        let mut pass = ReconcilePass::new(input);
        pass.build(Topology::Direct).unwrap();
        pass.build(Topology::Transformer).unwrap();

        let mut sink = MemoryStatusSink::default();
        let report = pass.finish(&mut sink);
        assert_eq!(sink.publish_count, 1);
        assert_eq!(report.metrics.len(), 2);
        assert_eq!(report.failed_metrics(), 0);
        assert_eq!(report.cardinality_warnings(), 1);
        assert_eq!(
            report.metrics[&ResourceKey::new("netobserv", "by-pod")]
                .prometheus_name
                .as_deref(),
            Some("netobserv_by_pod")
        );
    }

    #[test]
    fn test_failing_custom_metric_does_not_abort() {
        let mut broken = custom_metric("broken", &[]);
        broken.spec.buckets = vec!["zero".to_string()];
        let input = BuildInput {
            flow_metrics: vec![broken],
            ..Default::default()
        };

        let mut pass = ReconcilePass::new(input);
        let compiled = pass.build(Topology::Direct).unwrap();
        assert!(!compiled.config.stage_names().is_empty());

        let report = pass.finish(&mut MemoryStatusSink::default());
        assert_eq!(report.failed_metrics(), 1);
    }

    #[test]
    fn test_custom_metric_failures_counted_once_per_pass() {
        let flow_metrics = ["broken-a", "broken-b", "broken-c"]
            .into_iter()
            .map(|name| {
                let mut fm = custom_metric(name, &[]);
                fm.spec.buckets = vec!["zero".to_string()];
                fm
            })
            .collect();
        let mut input = BuildInput {
            flow_metrics,
            ..Default::default()
        };
        input.spec.kafka.address = "kafka:9092".to_string();
        input.spec.kafka.topic = "flows".to_string();

        let metrics = CompilerMetrics::new();
        let before = metrics.custom_metric_failures();
        let mut pass = ReconcilePass::new(input);
        pass.build(Topology::Direct).unwrap();
        pass.build(Topology::Transformer).unwrap();
        let report = pass.finish(&mut MemoryStatusSink::default());
        assert_eq!(report.failed_metrics(), 3);

        // The counter is process-wide; a concurrent test may add its own single failure
        let delta = metrics.custom_metric_failures() - before;
        assert!((3..6).contains(&delta), "counted {} failures", delta);
    }

    #[test]
    fn test_subnet_warning_stays_single_across_topologies() {
        let mut input = BuildInput::default();
        input.spec.kafka.address = "kafka:9092".to_string();
        input.spec.kafka.topic = "flows".to_string();
        input.spec.processor.slices_config.enable = true;
        input.spec.processor.subnet_labels.custom_labels = vec![SubnetLabel {
            name: "cluster".to_string(),
            cidrs: vec!["10.100.0.0/16".to_string()],
        }];
        input.slices = vec![NamespaceSlice {
            name: "s1".to_string(),
            namespace: "team-a".to_string(),
            sampling: 1,
            subnet_labels: vec![SubnetLabel {
                name: "inner".to_string(),
                cidrs: vec!["10.100.10.0/24".to_string()],
            }],
        }];
        let key = ResourceKey::new("team-a", "s1");

        let mut single = ReconcilePass::new(input.clone());
        single.build(Topology::Direct).unwrap();
        let single = single.finish(&mut MemoryStatusSink::default());

        let mut both = ReconcilePass::new(input);
        both.build(Topology::Direct).unwrap();
        both.build(Topology::Transformer).unwrap();
        let both = both.finish(&mut MemoryStatusSink::default());

        let message = |report: &StatusReport| {
            report.slices[&key]
                .subnet_warning
                .as_ref()
                .map(|c| c.message.clone())
        };
        assert_eq!(message(&both), message(&single));
        assert_eq!(
            message(&both).as_deref(),
            Some("CIDR for 'inner' (10.100.10.0/24) is fully overlapped by config (admin: 10.100.0.0/16)")
        );
        assert_eq!(both.slices[&key].subnet_labels_configured, 1);
    }

    #[test]
    fn test_bad_slice_cidr_aborts_and_keeps_failure() {
        let mut input = BuildInput::default();
        input.spec.processor.slices_config.enable = true;
        input.slices = vec![NamespaceSlice {
            name: "s1".to_string(),
            namespace: "team-a".to_string(),
            sampling: 1,
            subnet_labels: vec![SubnetLabel {
                name: "internal".to_string(),
                cidrs: vec!["10.0.0.0/99".to_string()],
            }],
        }];

        let mut pass = ReconcilePass::new(input);
        let err = pass.build(Topology::Direct).unwrap_err();
        assert!(!err.is_internal());

        let report = pass.finish(&mut MemoryStatusSink::default());
        let slice = &report.slices[&ResourceKey::new("team-a", "s1")];
        assert!(!slice.ready.as_ref().unwrap().is_true());
    }

    #[test]
    fn test_transformer_without_kafka_fails() {
        let metrics = CompilerMetrics::new();
        let before = metrics.build_failures();
        let mut pass = ReconcilePass::new(BuildInput::default());
        assert!(pass.build(Topology::Transformer).is_err());
        assert!(metrics.build_failures() > before);
    }
}
