//! Windup Kubernetes Operator binary.
//!
//! Watches Windup custom resources and the objects they own, and runs the
//! dependent-resource workflow for each instance.

use futures::StreamExt;
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::runtime::Controller;
use kube::runtime::controller::Action;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::{Api, Client, CustomResourceExt, Resource};
use std::sync::Arc;
use windup_operator::config::OperatorConfig;
use windup_operator::controller::{ControllerContext, WindupController, error_policy};
use windup_operator::crd::Windup;
use windup_operator::observability::{LogConfig, init_tracing};
use windup_operator::store::KubeStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing(&LogConfig::from_env())?;

    // Check for CRD generation mode
    if std::env::args().any(|arg| arg == "--generate-crds") {
        generate_crds()?;
        return Ok(());
    }

    tracing::info!("Starting Windup Kubernetes Operator");

    let config = Arc::new(OperatorConfig::from_env());
    tracing::info!(
        watch_namespace = config.watch_namespace.as_deref().unwrap_or("<all>"),
        requeue_seconds = config.requeue_delay.as_secs(),
        max_concurrent_applies = config.max_concurrent_applies,
        "Loaded operator configuration"
    );

    let client = Client::try_default().await?;
    tracing::info!("Connected to Kubernetes cluster");

    let store = Arc::new(KubeStore::new(client.clone(), config.field_manager.clone()));
    // An invalid workflow graph is a programming error and stops the process.
    let ctx = Arc::new(ControllerContext::new(store, Arc::clone(&config))?);

    run_windup_controller(client, ctx, config.watch_namespace.as_deref()).await
}

fn scoped_api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

/// Run the Windup controller until a shutdown signal arrives.
async fn run_windup_controller(
    client: Client,
    ctx: Arc<ControllerContext>,
    namespace: Option<&str>,
) -> anyhow::Result<()> {
    tracing::info!("Starting Windup controller");

    let windups: Api<Windup> = scoped_api(&client, namespace);
    let controller = WindupController::new(Arc::clone(&ctx));

    Controller::new(windups, WatcherConfig::default())
        .owns(
            scoped_api::<Secret>(&client, namespace),
            WatcherConfig::default(),
        )
        .owns(
            scoped_api::<PersistentVolumeClaim>(&client, namespace),
            WatcherConfig::default(),
        )
        .owns(
            scoped_api::<Deployment>(&client, namespace),
            WatcherConfig::default(),
        )
        .owns(
            scoped_api::<Service>(&client, namespace),
            WatcherConfig::default(),
        )
        .owns(
            scoped_api::<Ingress>(&client, namespace),
            WatcherConfig::default(),
        )
        .shutdown_on_signal()
        .run(
            move |windup, _ctx| {
                let controller = controller.clone();
                async move { controller.reconcile(windup).await.map(Action::from) }
            },
            error_policy,
            ctx,
        )
        .for_each(|result| async move {
            match result {
                Ok((obj, action)) => {
                    tracing::debug!(
                        windup = %obj.name,
                        namespace = obj.namespace.as_deref().unwrap_or_default(),
                        ?action,
                        "Reconciled Windup"
                    );
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Windup controller stream error");
                }
            }
        })
        .await;

    tracing::info!("Windup controller stopped");
    Ok(())
}

/// Print the Windup CRD as YAML.
fn generate_crds() -> anyhow::Result<()> {
    println!("---");
    println!("{}", serde_yaml::to_string(&Windup::crd())?);
    Ok(())
}
