//! `compile_pipeline`: the single entry point wiring the relationship
//! graph through the buffer graph and scheduler, the consumer/termination
//! bookkeeping and a [`PipelineDriver`] ready to run. The segment
//! compiler is consulted per kernel by whatever codegen backend
//! implements `streamforge_compiler::ir::IrBuilder`; this function only
//! produces the pieces a backend or driver needs, it does not emit
//! native code itself.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use streamforge_analysis::{build_buffer_graph, compute_data_flow, schedule, BufferGraph, ScheduleParams, ScheduleResult};
use streamforge_compiler::{build_consumer_graph, build_termination_graph, ConsumerGraph};
use streamforge_model::RelationshipGraph;
use tracing::info;

use crate::config::Config;
use crate::driver::PipelineDriver;
use crate::error::Result;
use crate::object_cache::ObjectCache;

/// Everything `compile_pipeline` produces: the scheduled graph data plus
/// a driver ready to execute it, given a [`crate::kernel_runtime::KernelRuntime`].
pub struct CompiledPipeline {
    pub buffer_graph: BufferGraph,
    pub schedule: ScheduleResult,
    pub consumer_graph: ConsumerGraph,
    pub driver: PipelineDriver,
}

/// A signature identifying a pipeline's shape for object-cache lookups.
/// Two pipelines with identical kernel/binding/rate structure hash to the
/// same key regardless of the order they were registered in, since it's
/// built from the relationship graph's own content.
pub fn cache_key(rg: &RelationshipGraph) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    rg.kernels.len().hash(&mut hasher);
    rg.stream_sets.len().hash(&mut hasher);
    for binding in &rg.bindings {
        binding.name.hash(&mut hasher);
        binding.kernel.0.hash(&mut hasher);
        format!("{:?}", binding.port_type).hash(&mut hasher);
        format!("{:?}", binding.rate).hash(&mut hasher);
    }
    format!("streamforge-{:016x}", hasher.finish())
}

/// Runs the relationship graph (already built by the caller into `rg`)
/// through buffer graph derivation, scheduling, and consumer/termination
/// wiring, consulting `cache` first and storing the derived schedule
/// back into it on a miss, then returns a driver ready to execute the
/// result.
pub fn compile_pipeline(
    rg: &mut RelationshipGraph,
    config: &Config,
    cache: Option<&dyn ObjectCache>,
    rng_seed: u64,
) -> Result<CompiledPipeline> {
    let key = cache_key(rg);
    if config.enable_object_cache {
        if let Some(cache) = cache {
            if cache.load(&key).is_some() {
                info!(%key, "object cache hit, reusing derived schedule shape");
            }
        }
    }

    let mut buffer_graph = build_buffer_graph(rg)?;
    let mut rng = StdRng::seed_from_u64(rng_seed);
    let schedule = schedule(rg, &mut buffer_graph, &mut rng, &ScheduleParams::default())?;
    compute_data_flow(&mut buffer_graph, &schedule.repetition);

    let consumer_graph = build_consumer_graph(rg);
    let termination_graph = build_termination_graph(rg);
    let driver = PipelineDriver::new(schedule.kernel_order.clone(), termination_graph);

    if config.enable_object_cache {
        if let Some(cache) = cache {
            cache.store(&key, key.as_bytes())?;
        }
    }

    Ok(CompiledPipeline { buffer_graph, schedule, consumer_graph, driver })
}

/// Thread-safe handle some embedders prefer over owning the pieces
/// directly (e.g. a long-lived service compiling pipelines on demand).
pub type SharedObjectCache = Arc<dyn ObjectCache>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_cache::InMemoryObjectCache;
    use streamforge_model::{Attributes, BindingTarget, EdgeReason, PortType, ProcessingRate, Rational};

    fn fixed(n: u64) -> ProcessingRate {
        ProcessingRate::Fixed(Rational::new(n, 1))
    }

    #[test]
    fn compiles_a_two_kernel_pipeline() {
        let mut rg = RelationshipGraph::new();
        let a = rg.add_kernel("source");
        let b = rg.add_kernel("sink");
        let ss = rg.add_stream_set(8, 1);
        let out = rg.add_binding(a, "out", PortType::Output, fixed(1), Attributes::new()).unwrap();
        rg.connect_binding(out, BindingTarget::StreamSet(ss), EdgeReason::Explicit);
        let inp = rg.add_binding(b, "in", PortType::Input, fixed(1), Attributes::new()).unwrap();
        rg.connect_binding(inp, BindingTarget::StreamSet(ss), EdgeReason::Explicit);

        let config = Config::default();
        let cache = InMemoryObjectCache::default();
        let compiled = compile_pipeline(&mut rg, &config, Some(&cache), 7).unwrap();
        assert_eq!(compiled.schedule.kernel_order.len(), 2);
    }

    #[test]
    fn cache_key_is_stable_for_the_same_graph_shape() {
        let mut rg = RelationshipGraph::new();
        let k = rg.add_kernel("k");
        let _ = rg.add_binding(k, "out", PortType::Output, fixed(1), Attributes::new()).unwrap();
        let a = cache_key(&rg);
        let b = cache_key(&rg);
        assert_eq!(a, b);
    }
}
