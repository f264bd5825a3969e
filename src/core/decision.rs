//! IF-005: Deterministic decision engine.
//!
//! `decide` maps one request to one decision using only the policy tables.
//! No I/O, no clock, no randomness: equal inputs give equal outputs.

use super::policy::DecisionPolicy;
use super::types::{
    CostBreakdown, Environment, InfrastructureDecision, InfrastructureRequest, InstanceSize,
    SkuTier,
};
use crate::error::DecisionError;
use tracing::debug;

/// Derive a complete infrastructure decision from a request.
pub fn decide(
    request: &InfrastructureRequest,
    policy: &DecisionPolicy,
) -> Result<InfrastructureDecision, DecisionError> {
    let env = request.environment();
    let size = classify_size(request, policy);

    let table = if request.enable_gpu() {
        &policy.gpu_instances
    } else {
        &policy.cpu_instances
    };
    let pair = table.get(size);

    let sku = select_sku(request, policy);
    let (min_workers, max_workers) = worker_bounds(env, policy);

    let cost = estimate_cost(policy, sku, env, &pair.worker, min_workers, max_workers)?;
    if let Some(limit) = request.cost_limit() {
        if cost.total > limit {
            return Err(DecisionError::CostLimitExceeded {
                estimate: cost.total,
                limit,
            });
        }
    }

    let name = match request.name() {
        Some(n) => sanitize_name(n),
        None => sanitize_name(&format!("{}-{}", request.team(), env)),
    };
    let runtime_version = if request.enable_gpu() {
        policy.runtime_gpu.clone()
    } else {
        policy.runtime_cpu.clone()
    };
    let idle_timeout_minutes = *policy.idle_timeout_minutes.get(env);

    let justification = justify(request, size, sku, min_workers, max_workers, &cost);
    debug!(name = %name, size = %size, sku = %sku, total = cost.total, "decision derived");

    Ok(InfrastructureDecision {
        resource_group_name: format!("rg-{}", name),
        name,
        region: request.region().to_string(),
        sku,
        instance_size: size,
        driver_instance_type: pair.driver.clone(),
        worker_instance_type: pair.worker.clone(),
        min_workers,
        max_workers,
        runtime_version,
        idle_timeout_minutes,
        enable_gpu: request.enable_gpu(),
        instance_pool: request.instance_pool(),
        cost,
        justification,
    })
}

/// Workload size shifted by the environment offset, clamped to the table.
pub fn classify_size(request: &InfrastructureRequest, policy: &DecisionPolicy) -> InstanceSize {
    policy
        .base_size(request.workload_type())
        .shift(*policy.size_offset.get(request.environment()))
}

/// Top tier for the configured environments, lowest elsewhere; an explicit
/// override always wins.
pub fn select_sku(request: &InfrastructureRequest, policy: &DecisionPolicy) -> SkuTier {
    if let Some(sku) = request.sku_override() {
        return sku;
    }
    if policy
        .top_tier_environments
        .contains(&request.environment())
    {
        SkuTier::TOP
    } else {
        SkuTier::LOWEST
    }
}

/// Autoscaling bounds for an environment with the prod floor applied.
pub fn worker_bounds(env: Environment, policy: &DecisionPolicy) -> (u32, u32) {
    let bounds = policy.workers.get(env);
    let mut min = bounds.min;
    if env == Environment::Prod {
        min = min.max(policy.prod_min_workers_floor);
    }
    (min, bounds.max.max(min))
}

/// Monthly cost for a worker class and autoscaling range.
///
/// `compute = (vm + dbu * rate) * avg(min, max) * hours`; the tier fee and
/// storage estimate are added on top. Non-decreasing in `max_workers`.
pub fn estimate_cost(
    policy: &DecisionPolicy,
    sku: SkuTier,
    env: Environment,
    worker_type: &str,
    min_workers: u32,
    max_workers: u32,
) -> Result<CostBreakdown, DecisionError> {
    let vm = policy.vm_hourly_usd.get(worker_type).copied().ok_or_else(|| {
        DecisionError::InvalidRequest(format!("no hourly price for instance '{}'", worker_type))
    })?;
    let dbu = policy.dbu_per_hour.get(worker_type).copied().ok_or_else(|| {
        DecisionError::InvalidRequest(format!("no DBU rating for instance '{}'", worker_type))
    })?;

    let hourly = vm + dbu * policy.dbu_rate.get(sku);
    let avg_workers = (min_workers as f64 + max_workers as f64) / 2.0;
    let compute = round_cents(hourly * avg_workers * policy.monthly_hours.get(env));
    let tier_fee = *policy.tier_fee.get(sku);
    let storage = policy.storage_monthly_usd;
    let total = round_cents(compute + tier_fee + storage);
    if !total.is_finite() {
        return Err(DecisionError::InvalidRequest(format!(
            "cost estimate for '{}' is not a finite number; check the policy prices",
            worker_type
        )));
    }

    Ok(CostBreakdown {
        compute,
        tier_fee,
        storage,
        total,
    })
}

/// Lowercase, with every character outside `[a-z0-9-]` replaced by `-`.
pub fn sanitize_name(raw: &str) -> String {
    raw.trim()
        .to_ascii_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

fn round_cents(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn justify(
    request: &InfrastructureRequest,
    size: InstanceSize,
    sku: SkuTier,
    min_workers: u32,
    max_workers: u32,
    cost: &CostBreakdown,
) -> String {
    let mut parts = vec![format!(
        "{} workload in {} sized {}",
        request.workload_type(),
        request.environment(),
        size
    )];
    parts.push(if request.enable_gpu() {
        "GPU instances requested".to_string()
    } else {
        "CPU instances".to_string()
    });
    parts.push(match request.sku_override() {
        Some(_) => format!("{} tier (explicit override)", sku),
        None => format!("{} tier for {}", sku, request.environment()),
    });
    parts.push(format!("autoscaling {}-{} workers", min_workers, max_workers));
    parts.push(format!("estimated ${:.2}/month", cost.total));
    if let Some(limit) = request.cost_limit() {
        parts.push(format!("within limit ${:.2}/month", limit));
    }
    parts.join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::WorkloadType;
    use proptest::prelude::*;

    fn request(team: &str, env: Environment, workload: WorkloadType, gpu: bool) -> InfrastructureRequest {
        InfrastructureRequest::builder(team, env)
            .workload_type(workload)
            .enable_gpu(gpu)
            .build()
            .unwrap()
    }

    #[test]
    fn test_if005_scenario_prod_ml_gpu() {
        let policy = DecisionPolicy::default();
        let r = request("ml-team", Environment::Prod, WorkloadType::Ml, true);
        let d = decide(&r, &policy).unwrap();
        assert_eq!(d.sku, SkuTier::Premium);
        assert!(policy.gpu_workers().contains(&d.worker_instance_type.as_str()));
        assert_eq!(d.worker_instance_type, "Standard_NC24s_v3");
        assert_eq!(d.driver_instance_type, "Standard_DS5_v2");
        assert_eq!(d.min_workers, 3);
        assert_eq!(d.max_workers, 10);
        assert_eq!(d.runtime_version, "13.3.x-gpu-ml-scala2.12");
        assert_eq!(d.idle_timeout_minutes, 120);
        assert_eq!(d.name, "ml-team-prod");
        assert_eq!(d.resource_group_name, "rg-ml-team-prod");
    }

    #[test]
    fn test_if005_scenario_dev_data_engineering() {
        let policy = DecisionPolicy::default();
        let r = request("analytics", Environment::Dev, WorkloadType::DataEngineering, false);
        let d = decide(&r, &policy).unwrap();
        assert_eq!(d.sku, SkuTier::Standard);
        assert!(policy.cpu_workers().contains(&d.worker_instance_type.as_str()));
        assert_eq!(d.instance_size, InstanceSize::Small);
        assert_eq!(d.min_workers, 1);
        assert_eq!(d.max_workers, 3);
        assert_eq!(d.runtime_version, "13.3.x-scala2.12");
        assert_eq!(d.idle_timeout_minutes, 30);
    }

    #[test]
    fn test_if005_cost_arithmetic() {
        let policy = DecisionPolicy::default();
        // staging data_engineering: medium CPU DS4_v2, standard tier, 2-5 workers
        let r = request("de", Environment::Staging, WorkloadType::DataEngineering, false);
        let d = decide(&r, &policy).unwrap();
        let hourly = 0.384 + 1.5 * 0.15;
        let expected_compute = ((hourly * 3.5 * 264.0) * 100.0_f64).round() / 100.0;
        assert_eq!(d.cost.compute, expected_compute);
        assert_eq!(d.cost.tier_fee, 75.0);
        assert_eq!(d.cost.storage, 200.0);
        assert!((d.cost.total - (expected_compute + 275.0)).abs() < 0.011);
    }

    #[test]
    fn test_if005_cost_limit_exceeded() {
        let policy = DecisionPolicy::default();
        let r = InfrastructureRequest::builder("ml", Environment::Prod)
            .workload_type(WorkloadType::Ml)
            .enable_gpu(true)
            .cost_limit(Some(500.0))
            .build()
            .unwrap();
        match decide(&r, &policy) {
            Err(DecisionError::CostLimitExceeded { estimate, limit }) => {
                assert_eq!(limit, 500.0);
                assert!(estimate > 500.0);
            }
            other => panic!("expected CostLimitExceeded, got {:?}", other),
        }
    }

    #[test]
    fn test_if005_non_finite_price_never_passes_limit() {
        let mut policy = DecisionPolicy::default();
        let req = InfrastructureRequest::builder("ml-team", Environment::Prod)
            .workload_type(WorkloadType::Ml)
            .cost_limit(Some(1.0))
            .build()
            .unwrap();
        let worker = policy.cpu_instances.large.worker.clone();
        policy.vm_hourly_usd.insert(worker, f64::NAN);
        match decide(&req, &policy) {
            Err(DecisionError::InvalidRequest(msg)) => assert!(msg.contains("not a finite")),
            other => panic!("expected InvalidRequest, got {:?}", other),
        }
    }

    #[test]
    fn test_if005_cost_limit_not_exceeded() {
        let policy = DecisionPolicy::default();
        let r = InfrastructureRequest::builder("bi", Environment::Dev)
            .workload_type(WorkloadType::Analytics)
            .cost_limit(Some(10_000.0))
            .build()
            .unwrap();
        let d = decide(&r, &policy).unwrap();
        assert!(d.justification.contains("within limit $10000.00/month"));
    }

    #[test]
    fn test_if005_sku_override_wins() {
        let policy = DecisionPolicy::default();
        let r = InfrastructureRequest::builder("x", Environment::Dev)
            .sku_override(Some(SkuTier::Premium))
            .build()
            .unwrap();
        let d = decide(&r, &policy).unwrap();
        assert_eq!(d.sku, SkuTier::Premium);
        assert!(d.justification.contains("explicit override"));
    }

    #[test]
    fn test_if005_explicit_name_sanitized() {
        let policy = DecisionPolicy::default();
        let r = InfrastructureRequest::builder("x", Environment::Dev)
            .name(Some("My Workspace_01".into()))
            .build()
            .unwrap();
        let d = decide(&r, &policy).unwrap();
        assert_eq!(d.name, "my-workspace-01");
        assert_eq!(d.resource_group_name, "rg-my-workspace-01");
    }

    #[test]
    fn test_if005_sanitize_name() {
        assert_eq!(sanitize_name("Data Team-prod"), "data-team-prod");
        assert_eq!(sanitize_name("a.b/c"), "a-b-c");
    }

    #[test]
    fn test_if005_prod_floor_overrides_policy() {
        let mut policy = DecisionPolicy::default();
        policy.workers.prod.min = 1;
        let (min, max) = worker_bounds(Environment::Prod, &policy);
        assert_eq!(min, 3);
        assert_eq!(max, 10);
    }

    #[test]
    fn test_if005_unpriced_instance() {
        let mut policy = DecisionPolicy::default();
        policy.vm_hourly_usd.shift_remove("Standard_DS4_v2");
        let r = request("t", Environment::Staging, WorkloadType::Etl, false);
        let err = decide(&r, &policy).unwrap_err();
        assert!(err.to_string().contains("Standard_DS4_v2"));
    }

    fn arb_env() -> impl Strategy<Value = Environment> {
        prop_oneof![
            Just(Environment::Dev),
            Just(Environment::Staging),
            Just(Environment::Prod)
        ]
    }

    fn arb_workload() -> impl Strategy<Value = WorkloadType> {
        prop_oneof![
            Just(WorkloadType::DataEngineering),
            Just(WorkloadType::Ml),
            Just(WorkloadType::Analytics),
            Just(WorkloadType::DataScience),
            Just(WorkloadType::Etl)
        ]
    }

    proptest! {
        #[test]
        fn test_if005_prop_deterministic(
            team in "[a-z][a-z0-9-]{0,12}",
            env in arb_env(),
            workload in arb_workload(),
            gpu in any::<bool>(),
        ) {
            let policy = DecisionPolicy::default();
            let r = request(&team, env, workload, gpu);
            prop_assert_eq!(decide(&r, &policy).unwrap(), decide(&r, &policy).unwrap());
        }

        #[test]
        fn test_if005_prop_gpu_routing(
            env in arb_env(),
            workload in arb_workload(),
            gpu in any::<bool>(),
        ) {
            let policy = DecisionPolicy::default();
            let d = decide(&request("t", env, workload, gpu), &policy).unwrap();
            let worker = d.worker_instance_type.as_str();
            if gpu {
                prop_assert!(policy.gpu_workers().contains(&worker));
            } else {
                prop_assert!(policy.cpu_workers().contains(&worker));
            }
        }

        #[test]
        fn test_if005_prop_prod_floor(workload in arb_workload(), gpu in any::<bool>()) {
            let policy = DecisionPolicy::default();
            let d = decide(&request("t", Environment::Prod, workload, gpu), &policy).unwrap();
            prop_assert_eq!(d.sku, SkuTier::TOP);
            prop_assert!(d.min_workers >= policy.prod_min_workers_floor);
        }

        #[test]
        fn test_if005_prop_cost_monotonic_in_max_workers(
            env in arb_env(),
            min in 0u32..8,
            extra in 0u32..20,
            step in 1u32..10,
            premium in any::<bool>(),
        ) {
            let policy = DecisionPolicy::default();
            let sku = if premium { SkuTier::Premium } else { SkuTier::Standard };
            let max = min + extra;
            let a = estimate_cost(&policy, sku, env, "Standard_DS4_v2", min, max).unwrap();
            let b = estimate_cost(&policy, sku, env, "Standard_DS4_v2", min, max + step).unwrap();
            prop_assert!(b.total >= a.total);
            prop_assert!(a.total >= 0.0);
        }

        #[test]
        fn test_if005_prop_cost_ceiling(
            env in arb_env(),
            workload in arb_workload(),
            gpu in any::<bool>(),
            fraction in 0.0f64..0.99,
        ) {
            let policy = DecisionPolicy::default();
            let unbounded = decide(&request("t", env, workload, gpu), &policy).unwrap();
            let limit = unbounded.cost.total * fraction;
            let r = InfrastructureRequest::builder("t", env)
                .workload_type(workload)
                .enable_gpu(gpu)
                .cost_limit(Some(limit))
                .build()
                .unwrap();
            let is_exceeded = matches!(
                decide(&r, &policy),
                Err(DecisionError::CostLimitExceeded { .. })
            );
            prop_assert!(is_exceeded);
        }
    }
}
