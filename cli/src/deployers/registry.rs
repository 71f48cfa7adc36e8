//! The static unit table, keyed by `(phase, order)`.

use anyhow::Result;
use datastack_common::PhaseId;

use crate::domain::{DeployError, FakeValue, PlatformConfig};

use super::helm::{HelmRelease, HelmRepo};
use super::repository::{RepoMode, RepoRemote, RepositoryUnit};
use super::secrets::{PLATFORM_SECRETS, SecretsUnit};
use super::terraform::{TerraformOutput, TerraformStack};
use super::{Condition, Unit, UnitKind};

const HASHICORP: HelmRepo = HelmRepo {
    name: "hashicorp",
    url: "https://helm.releases.hashicorp.com",
};
const JETSTACK: HelmRepo = HelmRepo {
    name: "jetstack",
    url: "https://charts.jetstack.io",
};
const INGRESS_NGINX: HelmRepo = HelmRepo {
    name: "ingress-nginx",
    url: "https://kubernetes.github.io/ingress-nginx",
};
const EXTERNAL_DNS: HelmRepo = HelmRepo {
    name: "external-dns",
    url: "https://kubernetes-sigs.github.io/external-dns",
};
const EXTERNAL_SECRETS: HelmRepo = HelmRepo {
    name: "external-secrets",
    url: "https://charts.external-secrets.io",
};
const ARGO: HelmRepo = HelmRepo {
    name: "argo",
    url: "https://argoproj.github.io/argo-helm",
};
const PROMETHEUS_COMMUNITY: HelmRepo = HelmRepo {
    name: "prometheus-community",
    url: "https://prometheus-community.github.io/helm-charts",
};
const AIRBYTE: HelmRepo = HelmRepo {
    name: "airbyte",
    url: "https://airbytehq.github.io/helm-charts",
};
const APACHE_AIRFLOW: HelmRepo = HelmRepo {
    name: "apache-airflow",
    url: "https://airflow.apache.org",
};
const DATAHUB: HelmRepo = HelmRepo {
    name: "datahub",
    url: "https://helm.datahubproject.io",
};
const SUPERSET: HelmRepo = HelmRepo {
    name: "superset",
    url: "https://apache.github.io/superset",
};

const fn helm(
    phase: PhaseId,
    order: u8,
    service: &'static str,
    repo: Option<HelmRepo>,
    chart: &'static str,
    namespace: &'static str,
    version: &'static str,
) -> Unit {
    Unit {
        phase,
        order,
        service,
        when: Condition::Always,
        kind: UnitKind::Helm(HelmRelease {
            repo,
            chart,
            namespace,
            version,
        }),
    }
}

const fn terraform(order: u8, service: &'static str, outputs: &'static [TerraformOutput]) -> Unit {
    Unit {
        phase: PhaseId::Infrastructure,
        order,
        service,
        when: Condition::Always,
        kind: UnitKind::Terraform(TerraformStack { outputs }),
    }
}

/// Every deployable unit, in execution order.
pub static REGISTRY: &[Unit] = &[
    // ── 1: infrastructure ──
    terraform(1, "network", &[]),
    terraform(
        2,
        "cluster",
        &[TerraformOutput {
            name: "kubeconfig",
            file: "kubeconfig",
            fake: FakeValue::ClusterCredential,
        }],
    ),
    terraform(
        3,
        "storage",
        &[TerraformOutput {
            name: "service_account_key",
            file: "service-account.json",
            fake: FakeValue::ServiceAccount,
        }],
    ),
    // ── 2: secrets ──
    Unit {
        when: Condition::InClusterVault,
        ..helm(
            PhaseId::Secrets,
            1,
            "vault",
            Some(HASHICORP),
            "hashicorp/vault",
            "vault",
            "0.28.1",
        )
    },
    Unit {
        phase: PhaseId::Secrets,
        order: 2,
        service: "platform-secrets",
        when: Condition::Always,
        kind: UnitKind::Secrets(SecretsUnit {
            specs: PLATFORM_SECRETS,
        }),
    },
    // ── 3: repositories ──
    Unit {
        phase: PhaseId::Repositories,
        order: 1,
        service: "gitops-repo",
        when: Condition::Always,
        kind: UnitKind::Repository(RepositoryUnit {
            remote: RepoRemote::Gitops,
            mode: RepoMode::Publish,
        }),
    },
    Unit {
        phase: PhaseId::Repositories,
        order: 2,
        service: "dags-repo",
        when: Condition::Always,
        kind: UnitKind::Repository(RepositoryUnit {
            remote: RepoRemote::Dags,
            mode: RepoMode::Verify,
        }),
    },
    // ── 4: infrastructure services ──
    helm(
        PhaseId::InfrastructureServices,
        1,
        "cert-manager",
        Some(JETSTACK),
        "jetstack/cert-manager",
        "cert-manager",
        "v1.15.3",
    ),
    helm(
        PhaseId::InfrastructureServices,
        2,
        "ingress-nginx",
        Some(INGRESS_NGINX),
        "ingress-nginx/ingress-nginx",
        "ingress-nginx",
        "4.11.2",
    ),
    helm(
        PhaseId::InfrastructureServices,
        3,
        "external-dns",
        Some(EXTERNAL_DNS),
        "external-dns/external-dns",
        "external-dns",
        "1.15.0",
    ),
    helm(
        PhaseId::InfrastructureServices,
        4,
        "external-secrets",
        Some(EXTERNAL_SECRETS),
        "external-secrets/external-secrets",
        "external-secrets",
        "0.10.3",
    ),
    helm(
        PhaseId::InfrastructureServices,
        5,
        "argocd",
        Some(ARGO),
        "argo/argo-cd",
        "argocd",
        "7.5.2",
    ),
    helm(
        PhaseId::InfrastructureServices,
        6,
        "monitoring",
        Some(PROMETHEUS_COMMUNITY),
        "prometheus-community/kube-prometheus-stack",
        "monitoring",
        "62.7.0",
    ),
    // ── 5: data services ──
    helm(
        PhaseId::DataServices,
        1,
        "postgres",
        None,
        "oci://registry-1.docker.io/bitnamicharts/postgresql",
        "data",
        "15.5.38",
    ),
    helm(
        PhaseId::DataServices,
        2,
        "airbyte",
        Some(AIRBYTE),
        "airbyte/airbyte",
        "airbyte",
        "0.453.1",
    ),
    helm(
        PhaseId::DataServices,
        3,
        "airflow",
        Some(APACHE_AIRFLOW),
        "apache-airflow/airflow",
        "airflow",
        "1.15.0",
    ),
    Unit {
        phase: PhaseId::DataServices,
        order: 4,
        service: "dbt",
        when: Condition::Always,
        kind: UnitKind::Manifest { namespace: "dbt" },
    },
    helm(
        PhaseId::DataServices,
        5,
        "datahub",
        Some(DATAHUB),
        "datahub/datahub",
        "datahub",
        "0.4.20",
    ),
    helm(
        PhaseId::DataServices,
        6,
        "superset",
        Some(SUPERSET),
        "superset/superset",
        "superset",
        "0.12.11",
    ),
    // ── 6: finalize ──
    Unit {
        phase: PhaseId::Finalize,
        order: 1,
        service: "artifact-bundle",
        when: Condition::Always,
        kind: UnitKind::ArtifactBundle,
    },
    Unit {
        phase: PhaseId::Finalize,
        order: 2,
        service: "summary",
        when: Condition::Always,
        kind: UnitKind::Manifest {
            namespace: "datastack-system",
        },
    },
];

/// The registry as a slice, for generic callers.
#[must_use]
pub fn registry() -> &'static [Unit] {
    REGISTRY
}

/// Namespace a service deploys into, looked up by service id.
#[must_use]
pub fn namespace_of(service: &str) -> Option<&'static str> {
    REGISTRY
        .iter()
        .find(|u| u.service == service)
        .and_then(Unit::namespace)
}

/// Reject `charts:` overrides for services that are not helm releases.
///
/// # Errors
///
/// Returns `DeployError::Configuration` naming the first unknown key.
pub fn validate_chart_overrides(config: &PlatformConfig) -> Result<()> {
    for service in config.charts.keys() {
        let is_release = REGISTRY
            .iter()
            .any(|u| u.service == service && matches!(u.kind, UnitKind::Helm(_)));
        if !is_release {
            let releases: Vec<&str> = REGISTRY
                .iter()
                .filter(|u| matches!(u.kind, UnitKind::Helm(_)))
                .map(|u| u.service)
                .collect();
            return Err(DeployError::config(
                format!("charts.{service} does not name a helm release"),
                format!("valid keys: {}", releases.join(", ")),
            )
            .into());
        }
    }
    Ok(())
}
