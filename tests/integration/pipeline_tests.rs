//! End-to-end runs over the directory store

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use peer_cert_signer::models::{StatusComponent, TLS_CERT_KEY, TLS_PRIVATE_KEY_KEY};
use peer_cert_signer::services::{
    CaLoader, Dispatcher, ExponentialBackoff, FileStore, RequestStore, RequestWatcher,
    SignerController, StatusManager, WorkQueue,
};

use crate::common::*;

struct TempRoot(PathBuf);

impl TempRoot {
    fn new() -> Self {
        let path = std::env::temp_dir().join(format!("signer-pipeline-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&path).unwrap();
        Self(path)
    }
}

impl Drop for TempRoot {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

fn write_ca_secret(root: &TempRoot, ca: &TestCa) {
    let dir = root.0.join("secrets").join(CA_NAMESPACE).join(CA_NAME);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(TLS_CERT_KEY), &ca.cert_pem).unwrap();
    std::fs::write(dir.join(TLS_PRIVATE_KEY_KEY), &ca.key_pem).unwrap();
}

struct Running {
    store: Arc<FileStore>,
    health: Arc<StatusManager>,
    shutdown: CancellationToken,
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl Running {
    async fn start(root: &TempRoot, status_file: Option<PathBuf>) -> Self {
        let store = Arc::new(FileStore::new(&root.0));
        store.ensure_layout().await.unwrap();

        let health = Arc::new(StatusManager::new(status_file));
        let ca = CaLoader::new(store.clone(), CA_NAMESPACE, CA_NAME);
        let controller = Arc::new(SignerController::new(
            SIGNER_NAME,
            store.clone(),
            ca,
            health.clone(),
        ));

        let backoff =
            ExponentialBackoff::new(Duration::from_millis(20), Duration::from_millis(200), 0.0)
                .unwrap();
        let queue = Arc::new(WorkQueue::new(backoff));
        let watcher = RequestWatcher::new(store.clone(), queue.clone(), Duration::from_millis(25));
        let dispatcher = Dispatcher::new(controller, queue, 2);

        let shutdown = CancellationToken::new();
        let tasks = vec![
            tokio::spawn(watcher.run(shutdown.clone())),
            tokio::spawn(dispatcher.run(shutdown.clone())),
        ];

        Self {
            store,
            health,
            shutdown,
            tasks,
        }
    }

    async fn wait_until_issued(&self, name: &str) -> bool {
        for _ in 0..200 {
            if let Ok(request) = self.store.get(name).await {
                if request.is_issued() {
                    return true;
                }
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        false
    }

    async fn stop(self) {
        self.shutdown.cancel();
        for task in self.tasks {
            tokio::time::timeout(Duration::from_secs(5), task)
                .await
                .expect("task did not stop")
                .unwrap();
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pending_request_is_approved_and_signed() {
    let root = TempRoot::new();
    let ca = TestCa::generate("ovn-ca");
    write_ca_secret(&root, &ca);
    let status_file = root.0.join("status.json");

    let running = Running::start(&root, Some(status_file.clone())).await;
    running
        .store
        .create(&pending_request("node-a", SIGNER_NAME))
        .await
        .unwrap();
    running
        .store
        .create(&pending_request("node-b", SIGNER_NAME))
        .await
        .unwrap();
    running
        .store
        .create(&pending_request("foreign", OTHER_SIGNER_NAME))
        .await
        .unwrap();

    assert!(running.wait_until_issued("node-a").await);
    assert!(running.wait_until_issued("node-b").await);

    let foreign = running.store.get("foreign").await.unwrap();
    assert_eq!(foreign.metadata.resource_version, 1);
    assert!(foreign.status.conditions.is_empty());

    let node_a = running.store.get("node-a").await.unwrap();
    // create, approve, issue
    assert_eq!(node_a.metadata.resource_version, 3);

    let status = running
        .health
        .get(StatusComponent::CertificateSigner)
        .unwrap();
    assert!(!status.degraded);
    let written: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&status_file).unwrap()).unwrap();
    assert_eq!(written["CertificateSigner"]["degraded"], false);

    running.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_missing_ca_recovers_after_secret_appears() {
    let root = TempRoot::new();
    let running = Running::start(&root, None).await;
    running
        .store
        .create(&approved_request("node-a"))
        .await
        .unwrap();

    // Wait for the failure to be recorded
    let mut degraded = false;
    for _ in 0..200 {
        if running.health.is_degraded() {
            degraded = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    assert!(degraded);
    let status = running
        .health
        .get(StatusComponent::CertificateSigner)
        .unwrap();
    assert_eq!(status.reason, "CAFailure");

    let ca = TestCa::generate("ovn-ca");
    write_ca_secret(&root, &ca);

    assert!(running.wait_until_issued("node-a").await);
    assert!(!running.health.is_degraded());

    running.stop().await;
}
