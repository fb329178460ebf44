#![allow(missing_docs)]

use std::collections::BTreeMap;

use regraft::engine::reconcile::{reconcile, LabelTable, ReconcileScope};
use regraft::model::{PropertyValue, VertexId};
use regraft::rules::{RelationKind, RuleCatalog, PARENTAGE_KEY};
use regraft::store::{GraphStore, GraphTxn, MemoryStore};

const RULES: &str = r#"
    [[rule]]
    out = "device"
    in = "interface"
    label = "contains"
    kind = "tree"
    multiplicity = "many-to-one"

    [[rule]]
    out = "device"
    in = "location"
    label = "located-at"
    kind = "cousin"
    multiplicity = "simple"

    [[rule]]
    out = "device"
    in = "location"
    label = "managed-from"
    kind = "cousin"
    [rule.properties]
    derived = "true"
"#;

fn catalog() -> RuleCatalog {
    RuleCatalog::from_toml_str(RULES).expect("catalog")
}

fn marker(kind: RelationKind) -> BTreeMap<String, PropertyValue> {
    let mut props = BTreeMap::new();
    props.insert(PARENTAGE_KEY.to_string(), kind.marker());
    props
}

struct Fixture {
    store: MemoryStore,
    device: VertexId,
    interface: VertexId,
    location: VertexId,
}

fn fixture() -> Fixture {
    let store = MemoryStore::new();
    let mut txn = store.begin().expect("begin");
    let device = txn.create_vertex("device").expect("device");
    let interface = txn.create_vertex("interface").expect("interface");
    let location = txn.create_vertex("location").expect("location");
    txn.commit().expect("commit");
    Fixture {
        store,
        device,
        interface,
        location,
    }
}

#[test]
fn nonconforming_label_is_rewritten_to_the_single_permitted_rule() {
    let fx = fixture();
    let mut txn = fx.store.begin().expect("begin");
    txn.create_edge(fx.device, fx.interface, "owns", marker(RelationKind::Tree))
        .expect("edge");
    txn.commit().expect("commit");

    let mut txn = fx.store.begin().expect("begin");
    let report = reconcile(
        txn.as_mut(),
        &catalog(),
        &ReconcileScope::all(),
        &LabelTable::new(),
    )
    .expect("reconcile");
    txn.commit().expect("commit");

    assert_eq!(report.processed, 1);
    assert_eq!(report.skipped, 0);

    let txn = fx.store.begin().expect("begin");
    let edges = txn.all_edges().expect("edges");
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].label, "contains");
    assert_eq!(
        edges[0].properties.get(PARENTAGE_KEY),
        Some(&RelationKind::Tree.marker())
    );
}

#[test]
fn rule_implied_properties_replace_the_old_property_set() {
    let fx = fixture();
    let mut txn = fx.store.begin().expect("begin");
    let mut props = marker(RelationKind::Cousin);
    props.insert("stale".into(), PropertyValue::Str("old".into()));
    txn.create_edge(fx.device, fx.location, "managed-from", props)
        .expect("edge");
    txn.commit().expect("commit");

    let mut txn = fx.store.begin().expect("begin");
    reconcile(
        txn.as_mut(),
        &catalog(),
        &ReconcileScope::all(),
        &LabelTable::new(),
    )
    .expect("reconcile");
    txn.commit().expect("commit");

    let txn = fx.store.begin().expect("begin");
    let edges = txn.all_edges().expect("edges");
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].label, "managed-from");
    assert!(edges[0].properties.get("stale").is_none());
    assert_eq!(
        edges[0].properties.get("derived"),
        Some(&PropertyValue::Str("true".into()))
    );
}

#[test]
fn edges_with_no_matching_rule_are_skipped_not_modified() {
    let fx = fixture();
    let mut txn = fx.store.begin().expect("begin");
    txn.create_edge(
        fx.interface,
        fx.location,
        "measured-at",
        marker(RelationKind::Cousin),
    )
    .expect("edge");
    txn.commit().expect("commit");

    let mut txn = fx.store.begin().expect("begin");
    let report = reconcile(
        txn.as_mut(),
        &catalog(),
        &ReconcileScope::all(),
        &LabelTable::new(),
    )
    .expect("reconcile");

    assert_eq!(report.processed, 0);
    assert_eq!(report.skipped, 1);
    let edges = txn.as_ref().all_edges().expect("edges");
    assert_eq!(edges[0].label, "measured-at");
}

#[test]
fn ambiguous_labels_resolve_through_the_rename_table_or_skip() {
    let fx = fixture();
    let mut txn = fx.store.begin().expect("begin");
    txn.create_edge(fx.device, fx.location, "houses", marker(RelationKind::Cousin))
        .expect("edge");
    txn.commit().expect("commit");

    // No table entry: two cousin candidates, nothing chosen, edge skipped.
    let mut txn = fx.store.begin().expect("begin");
    let report = reconcile(
        txn.as_mut(),
        &catalog(),
        &ReconcileScope::all(),
        &LabelTable::new(),
    )
    .expect("reconcile");
    txn.rollback().expect("rollback");
    assert_eq!(report.processed, 0);
    assert_eq!(report.skipped, 1);

    // With the old-label mapping the edge lands on located-at.
    let table = LabelTable::new().rename("houses", "located-at");
    let mut txn = fx.store.begin().expect("begin");
    let report = reconcile(txn.as_mut(), &catalog(), &ReconcileScope::all(), &table)
        .expect("reconcile");
    txn.commit().expect("commit");
    assert_eq!(report.processed, 1);

    let txn = fx.store.begin().expect("begin");
    assert_eq!(txn.all_edges().expect("edges")[0].label, "located-at");
}

#[test]
fn missing_parentage_is_tallied_and_inferred_when_rules_agree() {
    let fx = fixture();
    let mut txn = fx.store.begin().expect("begin");
    // No parentage marker; the only device->interface rules are tree.
    txn.create_edge(fx.device, fx.interface, "contains", BTreeMap::new())
        .expect("edge");
    txn.commit().expect("commit");

    let mut txn = fx.store.begin().expect("begin");
    let report = reconcile(
        txn.as_mut(),
        &catalog(),
        &ReconcileScope::all(),
        &LabelTable::new(),
    )
    .expect("reconcile");
    txn.commit().expect("commit");

    assert_eq!(report.missing_parentage, 1);
    assert_eq!(report.processed, 1);
    let txn = fx.store.begin().expect("begin");
    assert_eq!(
        txn.all_edges().expect("edges")[0].properties.get(PARENTAGE_KEY),
        Some(&RelationKind::Tree.marker())
    );
}

#[test]
fn multiplicity_violations_are_tallied_per_shape_and_do_not_abort() {
    let fx = fixture();
    let mut txn = fx.store.begin().expect("begin");
    let second_device = txn.create_vertex("device").expect("device2");
    // Two tree parents for one interface; contains is many-to-one.
    txn.create_edge(fx.device, fx.interface, "contains", marker(RelationKind::Tree))
        .expect("edge1");
    txn.create_edge(
        second_device,
        fx.interface,
        "contains",
        marker(RelationKind::Tree),
    )
    .expect("edge2");
    txn.commit().expect("commit");

    let mut txn = fx.store.begin().expect("begin");
    let report = reconcile(
        txn.as_mut(),
        &catalog(),
        &ReconcileScope::all(),
        &LabelTable::new(),
    )
    .expect("reconcile");
    txn.commit().expect("commit");

    // Each of the two parents would, recreated, exceed many-to-one while
    // the other exists: both are tallied and both stay untouched.
    assert_eq!(report.processed, 0);
    assert_eq!(
        report.multiplicity.get("device -[tree]-> interface"),
        Some(&2)
    );
    let txn = fx.store.begin().expect("begin");
    assert_eq!(txn.all_edges().expect("edges").len(), 2, "violating edges stay");
}

#[test]
fn reconciliation_is_idempotent() {
    let fx = fixture();
    let mut txn = fx.store.begin().expect("begin");
    let second_device = txn.create_vertex("device").expect("device2");
    txn.create_edge(fx.device, fx.interface, "owns", marker(RelationKind::Tree))
        .expect("tree edge");
    txn.create_edge(fx.device, fx.location, "located-at", marker(RelationKind::Cousin))
        .expect("cousin edge");
    txn.create_edge(
        second_device,
        fx.interface,
        "contains",
        marker(RelationKind::Tree),
    )
    .expect("second parent");
    txn.create_edge(
        fx.interface,
        fx.location,
        "measured-at",
        marker(RelationKind::Cousin),
    )
    .expect("unruled edge");
    txn.commit().expect("commit");

    let run = || {
        let mut txn = fx.store.begin().expect("begin");
        let report = reconcile(
            txn.as_mut(),
            &catalog(),
            &ReconcileScope::all(),
            &LabelTable::new(),
        )
        .expect("reconcile");
        txn.commit().expect("commit");
        report
    };
    let first = run();
    let second = run();

    assert_eq!(second.processed, first.processed);
    assert_eq!(second.skipped, first.skipped);
    assert_eq!(second.multiplicity, first.multiplicity);

    // No edge changes shape on the second pass: the conforming parent keeps
    // `contains`, while the `owns` edge can never be rewritten without
    // exceeding many-to-one and stays as it is.
    let txn = fx.store.begin().expect("begin");
    let mut labels: Vec<String> = txn
        .all_edges()
        .expect("edges")
        .into_iter()
        .map(|edge| edge.label)
        .collect();
    labels.sort();
    assert_eq!(labels, vec!["contains", "located-at", "measured-at", "owns"]);
}

#[test]
fn scope_restricts_to_the_requested_type_pairs() {
    let fx = fixture();
    let mut txn = fx.store.begin().expect("begin");
    txn.create_edge(fx.device, fx.interface, "owns", marker(RelationKind::Tree))
        .expect("tree edge");
    txn.create_edge(fx.device, fx.location, "houses", marker(RelationKind::Cousin))
        .expect("cousin edge");
    txn.commit().expect("commit");

    let mut txn = fx.store.begin().expect("begin");
    let report = reconcile(
        txn.as_mut(),
        &catalog(),
        &ReconcileScope::between("device", "interface"),
        &LabelTable::new(),
    )
    .expect("reconcile");
    txn.commit().expect("commit");

    // Only the device/interface edge is considered; the out-of-scope cousin
    // edge is neither processed nor counted.
    assert_eq!(report.processed, 1);
    assert_eq!(report.skipped, 0);
}
