//! Container resource resolution
//!
//! Effective requests and limits are resolved per dimension from three
//! tiers, most specific first: the workload (node) spec, the cluster-wide
//! common spec, and a built-in default table.
//!
//! When only one of request/limit is given at a tier, the other is
//! backfilled from it, except that a CPU limit is never invented: CPU stays
//! unbounded unless some tier sets a CPU limit explicitly.

use crate::quantity::non_zero;
use k8s_openapi::api::core::v1::ResourceRequirements;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::collections::BTreeMap;

/// Resource name for CPU
pub const CPU: &str = "cpu";
/// Resource name for memory
pub const MEMORY: &str = "memory";

/// Built-in defaults for the data node container
pub const DEFAULT_ES_CPU_REQUEST: &str = "100m";
pub const DEFAULT_ES_MEMORY_REQUEST: &str = "1Gi";
pub const DEFAULT_ES_MEMORY_LIMIT: &str = "4Gi";

/// Built-in defaults for the proxy sidecar
pub const DEFAULT_PROXY_CPU_REQUEST: &str = "100m";
pub const DEFAULT_PROXY_MEMORY_REQUEST: &str = "256Mi";
pub const DEFAULT_PROXY_MEMORY_LIMIT: &str = "256Mi";

/// Resource dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Cpu,
    Memory,
}

impl Dimension {
    /// Key used in requests/limits maps
    pub fn resource_name(self) -> &'static str {
        match self {
            Self::Cpu => CPU,
            Self::Memory => MEMORY,
        }
    }
}

/// Request and limit for one dimension. `None` means unset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuantityPair {
    pub request: Option<Quantity>,
    pub limit: Option<Quantity>,
}

impl QuantityPair {
    /// Read one dimension out of a requirements block, dropping zero quantities
    pub fn from_requirements(requirements: &ResourceRequirements, dimension: Dimension) -> Self {
        let name = dimension.resource_name();
        Self {
            request: non_zero(requirements.requests.as_ref().and_then(|r| r.get(name))),
            limit: non_zero(requirements.limits.as_ref().and_then(|l| l.get(name))),
        }
    }

    /// Neither request nor limit is set
    pub fn is_unset(&self) -> bool {
        self.request.is_none() && self.limit.is_none()
    }

    fn both(quantity: Quantity) -> Self {
        Self {
            request: Some(quantity.clone()),
            limit: Some(quantity),
        }
    }
}

/// Named default tables, passed explicitly to the resolver
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultResources {
    pub elasticsearch: ResourceRequirements,
    pub proxy: ResourceRequirements,
}

impl Default for DefaultResources {
    fn default() -> Self {
        Self {
            elasticsearch: requirements(
                &[(CPU, DEFAULT_ES_CPU_REQUEST), (MEMORY, DEFAULT_ES_MEMORY_REQUEST)],
                &[(MEMORY, DEFAULT_ES_MEMORY_LIMIT)],
            ),
            proxy: requirements(
                &[(CPU, DEFAULT_PROXY_CPU_REQUEST), (MEMORY, DEFAULT_PROXY_MEMORY_REQUEST)],
                &[(MEMORY, DEFAULT_PROXY_MEMORY_LIMIT)],
            ),
        }
    }
}

/// Build a `ResourceRequirements` from `(resource, quantity)` pairs.
/// Empty lists leave the corresponding map unset.
pub fn requirements(requests: &[(&str, &str)], limits: &[(&str, &str)]) -> ResourceRequirements {
    fn to_map(entries: &[(&str, &str)]) -> Option<BTreeMap<String, Quantity>> {
        (!entries.is_empty()).then(|| {
            entries
                .iter()
                .map(|(name, q)| ((*name).to_string(), Quantity((*q).to_string())))
                .collect()
        })
    }

    ResourceRequirements {
        requests: to_map(requests),
        limits: to_map(limits),
        ..Default::default()
    }
}

/// Resolve memory for one container
pub fn resolve_memory(workload: QuantityPair, cluster: QuantityPair, default: QuantityPair) -> QuantityPair {
    if cluster.is_unset() {
        return match (workload.request, workload.limit) {
            (None, None) => default,
            (None, Some(limit)) => QuantityPair::both(limit),
            (Some(request), None) => QuantityPair::both(request),
            (Some(request), Some(limit)) => QuantityPair {
                request: Some(request),
                limit: Some(limit),
            },
        };
    }

    QuantityPair {
        request: workload
            .request
            .or_else(|| cluster.request.clone())
            .or_else(|| cluster.limit.clone()),
        limit: workload.limit.or(cluster.limit).or(cluster.request),
    }
}

/// Resolve CPU for one container.
///
/// Same ladder as memory, but a limit is only ever taken from a tier that
/// set one: the default table contributes a request only, and a lone
/// request is not copied into the limit.
pub fn resolve_cpu(workload: QuantityPair, cluster: QuantityPair, default: QuantityPair) -> QuantityPair {
    if cluster.is_unset() {
        return match (workload.request, workload.limit) {
            (None, None) => QuantityPair {
                request: default.request,
                limit: None,
            },
            (None, Some(limit)) => QuantityPair::both(limit),
            (Some(request), limit) => QuantityPair {
                request: Some(request),
                limit,
            },
        };
    }

    QuantityPair {
        request: workload
            .request
            .or(cluster.request)
            .or_else(|| cluster.limit.clone()),
        limit: workload.limit.or(cluster.limit),
    }
}

/// Resolve effective requirements for a container from the workload spec,
/// the cluster-wide spec and a default table.
///
/// Only `cpu` and `memory` are carried over. Unresolved entries are left
/// out rather than written as `0`: a container with no CPU limit anywhere
/// gets no CPU limit, and a default table without a memory limit yields no
/// memory limit when no other tier sets one.
pub fn resolve(
    workload: &ResourceRequirements,
    cluster: &ResourceRequirements,
    defaults: &ResourceRequirements,
) -> ResourceRequirements {
    let pair = |d| {
        (
            QuantityPair::from_requirements(workload, d),
            QuantityPair::from_requirements(cluster, d),
            QuantityPair::from_requirements(defaults, d),
        )
    };

    let (w, c, d) = pair(Dimension::Memory);
    let memory = resolve_memory(w, c, d);
    let (w, c, d) = pair(Dimension::Cpu);
    let cpu = resolve_cpu(w, c, d);

    let mut requests = BTreeMap::new();
    let mut limits = BTreeMap::new();
    for (dimension, resolved) in [(Dimension::Cpu, cpu), (Dimension::Memory, memory)] {
        let name = dimension.resource_name().to_string();
        if let Some(request) = resolved.request {
            requests.insert(name.clone(), request);
        }
        if let Some(limit) = resolved.limit {
            limits.insert(name, limit);
        }
    }

    ResourceRequirements {
        requests: (!requests.is_empty()).then_some(requests),
        limits: (!limits.is_empty()).then_some(limits),
        ..Default::default()
    }
}

/// Requirements for the data node container
pub fn resolve_elasticsearch(
    node: &ResourceRequirements,
    common: &ResourceRequirements,
    defaults: &DefaultResources,
) -> ResourceRequirements {
    resolve(node, common, &defaults.elasticsearch)
}

/// Requirements for the proxy sidecar
pub fn resolve_proxy(
    node: &ResourceRequirements,
    common: &ResourceRequirements,
    defaults: &DefaultResources,
) -> ResourceRequirements {
    resolve(node, common, &defaults.proxy)
}
