use super::*;
use crate::{Controller, Outcome};
use accesserator_controller_core::{synthesize, Scope};
use tokio::time;
use tokio_util::sync::CancellationToken;

/// Drives every queued update through the controller.
async fn reconcile(
    controller: &Controller<Arc<Store>>,
    updates_rx: &mut mpsc::Receiver<Update>,
) -> Vec<Outcome> {
    let mut outcomes = vec![];
    for update in drain(updates_rx) {
        outcomes.push(controller.process(update).await.expect("update must apply"));
    }
    outcomes
}

#[tokio::test]
async fn enabled_to_disabled_converges() {
    let store = Arc::new(Store::default());
    let (index, mut updates_rx, _claims) = mk_index("test");
    let (_tx, rx) = mpsc::channel(1);
    let controller = Controller::new(
        store.clone(),
        TARGET_NS,
        rx,
        time::Duration::from_secs(1),
        CancellationToken::new(),
        metrics(),
    );

    index
        .write()
        .apply(mk_config("ns1", "orders-sec", "orders", true));
    assert_eq!(
        reconcile(&controller, &mut updates_rx).await,
        vec![Outcome::Created]
    );
    assert_eq!(store.names(), vec!["tokenx-ingress.ns1.orders-sec"]);

    // Disabling TokenX removes the derived policy.
    index
        .write()
        .apply(mk_config("ns1", "orders-sec", "orders", false));
    assert_eq!(
        reconcile(&controller, &mut updates_rx).await,
        vec![Outcome::Deleted]
    );
    assert!(store.names().is_empty());
    store.take_mutations();

    // A further pass changes nothing.
    index.read().resync();
    assert_eq!(
        reconcile(&controller, &mut updates_rx).await,
        vec![Outcome::Absent, Outcome::Swept(0)]
    );
    assert!(store.take_mutations().is_empty());
}

#[tokio::test]
async fn deleting_the_config_deletes_its_policy() {
    let store = Arc::new(Store::default());
    let (index, mut updates_rx, _claims) = mk_index("test");
    let (_tx, rx) = mpsc::channel(1);
    let controller = Controller::new(
        store.clone(),
        TARGET_NS,
        rx,
        time::Duration::from_secs(1),
        CancellationToken::new(),
        metrics(),
    );

    index
        .write()
        .apply(mk_config("ns1", "orders-sec", "orders", true));
    reconcile(&controller, &mut updates_rx).await;

    index
        .write()
        .delete("ns1".to_string(), "orders-sec".to_string());
    assert_eq!(
        reconcile(&controller, &mut updates_rx).await,
        vec![Outcome::Deleted]
    );
    assert!(store.names().is_empty());
}

#[tokio::test]
async fn missed_delete_is_collected_by_resync() {
    let store = Arc::new(Store::default());
    let (index, mut updates_rx, _claims) = mk_index("test");
    let (_tx, rx) = mpsc::channel(1);
    let controller = Controller::new(
        store.clone(),
        TARGET_NS,
        rx,
        time::Duration::from_secs(1),
        CancellationToken::new(),
        metrics(),
    );

    index
        .write()
        .apply(mk_config("ns1", "orders-sec", "orders", true));
    reconcile(&controller, &mut updates_rx).await;

    // The delete event is lost, e.g. while another replica held the lease.
    index
        .write()
        .delete("ns1".to_string(), "orders-sec".to_string());
    drain(&mut updates_rx);
    assert_eq!(store.names(), vec!["tokenx-ingress.ns1.orders-sec"]);

    index.read().resync();
    assert_eq!(
        reconcile(&controller, &mut updates_rx).await,
        vec![Outcome::Swept(1)]
    );
    assert!(store.names().is_empty());
}

#[tokio::test]
async fn leader_start_keeps_live_policies() {
    let config = mk_config("ns1", "orders-sec", "orders", true);
    let store = Arc::new(Store::default());
    store.insert(synthesize(&Scope::from_config(config.clone()), &target()).unwrap());

    let (index, mut updates_rx, _claims) = mk_unsynced_index("test");
    let (_tx, rx) = mpsc::channel(1);
    let controller = Controller::new(
        store.clone(),
        TARGET_NS,
        rx,
        time::Duration::from_secs(1),
        CancellationToken::new(),
        metrics(),
    );

    // The first resync tick fires before the watch has listed anything.
    let task = tokio::spawn(Index::run(index.clone(), time::Duration::from_secs(10)));
    time::sleep(time::Duration::from_millis(50)).await;
    assert!(reconcile(&controller, &mut updates_rx).await.is_empty());
    assert_eq!(store.names(), vec!["tokenx-ingress.ns1.orders-sec"]);

    index.write().reset(vec![config], Default::default());
    index.read().resync();
    assert_eq!(
        reconcile(&controller, &mut updates_rx).await,
        vec![Outcome::Unchanged, Outcome::Unchanged, Outcome::Swept(0)]
    );
    assert_eq!(store.names(), vec!["tokenx-ingress.ns1.orders-sec"]);
    assert!(store.take_mutations().is_empty());

    task.abort();
}

#[tokio::test]
async fn long_config_names_converge() {
    let store = Arc::new(Store::default());
    let (index, mut updates_rx, _claims) = mk_index("test");
    let (_tx, rx) = mpsc::channel(1);
    let controller = Controller::new(
        store.clone(),
        TARGET_NS,
        rx,
        time::Duration::from_secs(1),
        CancellationToken::new(),
        metrics(),
    );

    let name = "a".repeat(250);
    index.write().apply(mk_config("ns1", &name, "orders", true));
    assert_eq!(
        reconcile(&controller, &mut updates_rx).await,
        vec![Outcome::Created]
    );

    let policy = store.names().pop().unwrap();
    assert!(policy.len() <= 253, "{}", policy.len());
    let labels = store.get(TARGET_NS, &policy).unwrap().metadata.labels.unwrap();
    assert!(labels.values().all(|v| v.len() <= 63));

    // The bounded name is recognised as live by the sweep.
    index.read().resync();
    assert_eq!(
        reconcile(&controller, &mut updates_rx).await,
        vec![Outcome::Unchanged, Outcome::Swept(0)]
    );
    assert_eq!(store.names(), vec![policy]);
}
