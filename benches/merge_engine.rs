//! Benchmarks for the merge engine and the cross-policy conflict check
//!
//! Both run on every reconcile or admission request, so they should stay in
//! the microsecond range.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use kube::api::DynamicObject;
use serde_json::json;
use sriov_control_plane::admission::policy::check_policy_conflict;
use sriov_control_plane::apply::prepare_update;
use sriov_control_plane::crd::{
    SriovNetworkNicSelector, SriovNetworkNodePolicy, SriovNetworkNodePolicySpec,
};

fn webhook_configuration(hooks: usize, with_bundle: bool) -> DynamicObject {
    let webhooks: Vec<_> = (0..hooks)
        .map(|i| {
            let client_config = if with_bundle {
                json!({ "caBundle": "Y2VydGlmaWNhdGU=", "service": { "name": "operator" } })
            } else {
                json!({ "service": { "name": "operator" } })
            };
            json!({ "name": format!("hook-{}.sriovnetwork.openshift.io", i), "clientConfig": client_config })
        })
        .collect();

    serde_json::from_value(json!({
        "apiVersion": "admissionregistration.k8s.io/v1",
        "kind": "ValidatingWebhookConfiguration",
        "metadata": {
            "name": "sriov-operator-webhook-config",
            "resourceVersion": "1234",
            "annotations": { "service.beta.openshift.io/inject-cabundle": "true" }
        },
        "webhooks": webhooks
    }))
    .expect("valid webhook configuration")
}

fn bench_prepare_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge_engine");
    group.throughput(Throughput::Elements(1));

    let current = webhook_configuration(8, true);
    let desired = webhook_configuration(8, false);
    group.bench_function("webhook_configuration_8_hooks", |b| {
        b.iter(|| prepare_update(black_box(&current), black_box(&desired)));
    });

    let current: DynamicObject = serde_json::from_value(json!({
        "apiVersion": "v1",
        "kind": "Service",
        "metadata": { "name": "operator-webhook-service", "resourceVersion": "99" },
        "spec": { "clusterIP": "172.30.0.10", "ports": [{ "port": 443, "targetPort": 6443 }] }
    }))
    .expect("valid service");
    let mut desired = current.clone();
    desired.data["spec"] = json!({ "ports": [{ "port": 443, "targetPort": 6443 }] });
    group.bench_function("service", |b| {
        b.iter(|| prepare_update(black_box(&current), black_box(&desired)));
    });

    group.finish();
}

fn policy(name: &str, pf_names: Vec<String>) -> SriovNetworkNodePolicy {
    SriovNetworkNodePolicy::new(
        name,
        SriovNetworkNodePolicySpec {
            resource_name: name.replace('-', "_"),
            num_vfs: 64,
            nic_selector: SriovNetworkNicSelector {
                vendor: "8086".into(),
                pf_names,
                ..Default::default()
            },
            ..Default::default()
        },
    )
}

fn bench_policy_conflicts(c: &mut Criterion) {
    let mut group = c.benchmark_group("policy_conflicts");

    // 16 PFs, each split into two disjoint halves across the two policies
    let low = policy("low", (0..16).map(|i| format!("ens{}f0#0-31", i)).collect());
    let high = policy("high", (0..16).map(|i| format!("ens{}f0#32-63", i)).collect());
    group.throughput(Throughput::Elements(16 * 16));
    group.bench_function("disjoint_ranges_16_pfs", |b| {
        b.iter(|| check_policy_conflict(black_box(&high), black_box(&low)));
    });

    group.finish();
}

criterion_group!(benches, bench_prepare_update, bench_policy_conflicts);
criterion_main!(benches);
