//! Multi-unit graph pipeline.
//!
//! Each extraction unit (page, chunk, document) is built into its own graph
//! on the rayon pool; builds share only the read-only schema registry. The
//! per-unit graphs are then consolidated on the calling thread, in unit
//! order.

use rayon::prelude::*;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::builder::GraphBuilder;
use crate::config::{FailurePolicy, GraphConfig};
use crate::consolidate::Consolidator;
use crate::error::{TesseraError, TesseraResult};
use crate::graph::{Graph, GraphStats, SourceRef};
use crate::merge::{ConflictLog, MergeConflict};
use crate::schema::SchemaRegistry;

/// One validated instance and the unit it was extracted from.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionUnit {
    pub source: SourceRef,
    pub instance: Value,
}

impl ExtractionUnit {
    pub fn new(source: impl Into<SourceRef>, instance: Value) -> Self {
        Self {
            source: source.into(),
            instance,
        }
    }

    /// Wrap a typed instance.
    pub fn from_typed<T: Serialize>(source: impl Into<SourceRef>, value: &T) -> TesseraResult<Self> {
        Ok(Self::new(source, serde_json::to_value(value)?))
    }
}

/// A unit whose build failed and was skipped.
#[derive(Debug)]
pub struct UnitFailure {
    pub source: SourceRef,
    pub error: TesseraError,
}

/// Per-unit graphs of a batch, in unit order.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub graphs: Vec<(SourceRef, Graph)>,
    /// Conflicts between repeated entities inside single units.
    pub conflicts: Vec<MergeConflict>,
    pub failures: Vec<UnitFailure>,
}

impl BatchOutcome {
    pub fn succeeded(&self) -> usize {
        self.graphs.len()
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// Final result of a pipeline run.
#[derive(Debug)]
pub struct PipelineOutput {
    pub graph: Graph,
    /// Build-time conflicts followed by consolidation conflicts.
    pub conflicts: Vec<MergeConflict>,
    pub failures: Vec<UnitFailure>,
    pub stats: GraphStats,
}

/// Builds and consolidates graphs for batches of extraction units.
pub struct GraphPipeline {
    registry: SchemaRegistry,
    config: GraphConfig,
}

impl GraphPipeline {
    /// Create a pipeline, rejecting invalid configuration.
    ///
    /// The configured `max_nesting_depth` replaces the registry's own bound.
    pub fn new(mut registry: SchemaRegistry, config: GraphConfig) -> TesseraResult<Self> {
        config.validate()?;
        registry.set_max_depth(config.max_nesting_depth);
        Ok(Self { registry, config })
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// A builder borrowing this pipeline's schema and configuration.
    pub fn builder(&self) -> GraphBuilder<'_> {
        GraphBuilder::new(&self.registry, &self.config)
    }

    /// Build every unit concurrently.
    ///
    /// Schema errors abort the batch. Identity errors abort it under
    /// [`FailurePolicy::Abort`]; otherwise the unit is recorded as a failure
    /// and the remaining units still produce graphs.
    pub fn build_units(&self, root_type: &str, units: &[ExtractionUnit]) -> TesseraResult<BatchOutcome> {
        // Describe up front so a broken schema fails once, not once per unit.
        self.registry.describe(root_type)?;

        let builder = self.builder();
        let results: Vec<_> = units
            .par_iter()
            .map(|unit| builder.build_with_conflicts(&unit.instance, root_type, &unit.source))
            .collect();

        let mut outcome = BatchOutcome::default();
        let mut log = ConflictLog::new();
        for (unit, result) in units.iter().zip(results) {
            match result {
                Ok((graph, conflicts)) => {
                    log.extend(conflicts);
                    outcome.graphs.push((unit.source.clone(), graph));
                }
                Err(error) if error.is_fatal() => return Err(error),
                Err(error) => match self.config.failure_policy {
                    FailurePolicy::Abort => return Err(error),
                    FailurePolicy::SkipAndContinue => {
                        warn!(source = %unit.source, error = %error, "Skipping extraction unit");
                        outcome.failures.push(UnitFailure {
                            source: unit.source.clone(),
                            error,
                        });
                    }
                },
            }
        }
        outcome.conflicts = log.into_vec();

        info!(
            root_type = %root_type,
            units = units.len(),
            succeeded = outcome.succeeded(),
            failed = outcome.failed(),
            "Built extraction units"
        );
        Ok(outcome)
    }

    /// Build every unit, then consolidate the graphs in unit order.
    pub fn run(&self, root_type: &str, units: &[ExtractionUnit]) -> TesseraResult<PipelineOutput> {
        let batch = self.build_units(root_type, units)?;

        let consolidation = Consolidator::new(&self.config)
            .consolidate(batch.graphs.into_iter().map(|(_, graph)| graph))?;

        let mut log = ConflictLog::new();
        log.extend(batch.conflicts);
        log.extend(consolidation.conflicts);

        let stats = GraphStats::from_graph(&consolidation.graph);
        Ok(PipelineOutput {
            graph: consolidation.graph,
            conflicts: log.into_vec(),
            failures: batch.failures,
            stats,
        })
    }
}
