//! Integration tests for batch builds and the serialized graph form.

mod common;

use common::*;
use serde_json::json;
use tessera_core::{
    ConflictPolicy, Consolidator, ExtractionUnit, Graph, GraphConfig, GraphData, GraphStats,
    IdentityResolver, TypeDecl,
};

#[test]
fn test_parallel_batch_matches_sequential_builds() {
    let invoices: Vec<Invoice> = (0..40)
        .map(|i| {
            let address = format!("{} Main St", i % 3);
            invoice(&format!("F-{}", i % 7), acme(&address), vec![garden_work()])
        })
        .collect();
    let units: Vec<ExtractionUnit> = invoices
        .iter()
        .enumerate()
        .map(|(i, inv)| ExtractionUnit::from_typed(page(i + 1), inv).unwrap())
        .collect();

    let pipeline = pipeline(GraphConfig::default());
    let parallel = pipeline.run("Invoice", &units).unwrap();

    let builder = pipeline.builder();
    let sequential: Vec<Graph> = units
        .iter()
        .map(|u| builder.build(&u.instance, "Invoice", &u.source).unwrap())
        .collect();
    let expected = Consolidator::new(pipeline.config())
        .consolidate(sequential)
        .unwrap();

    assert_eq!(parallel.graph, expected.graph);
    assert_eq!(parallel.conflicts, expected.conflicts);
    assert_eq!(parallel.graph.nodes_of_type("Invoice").count(), 7);
}

#[test]
fn test_component_flattened_onto_person() {
    let mut inv = invoice("F-1", acme("1 Main St"), vec![]);
    inv.sent_to = Some(Person {
        name: "Jane Doe".to_string(),
        home: Some(Address {
            street: "Elm 5".to_string(),
            city: "Springfield".to_string(),
        }),
    });

    let pipeline = pipeline(GraphConfig::default());
    let graph = pipeline.builder().build_described(&inv, &page(1)).unwrap();

    let person = graph.nodes_of_type("Person").next().unwrap();
    assert_eq!(person.property_str("home.city"), Some("Springfield"));
    assert_eq!(graph.nodes_of_type("Address").count(), 0);

    let invoice_id = &graph.nodes_of_type("Invoice").next().unwrap().id;
    assert!(graph.contains_edge(invoice_id, &person.id, "SENT_TO"));
}

#[test]
fn test_serialized_graph_shape() {
    let inv = invoice("F-1", acme("1 Main St"), vec![garden_work()]);
    let pipeline = pipeline(GraphConfig::default());
    let graph = pipeline.builder().build_described(&inv, &page(1)).unwrap();

    let value = serde_json::to_value(&graph).unwrap();
    let nodes = value["nodes"].as_array().unwrap();
    assert_eq!(nodes.len(), 3);
    for node in nodes {
        assert!(node["id"].is_string());
        assert!(node["type"].is_string());
        assert!(node["properties"].is_object());
        assert_eq!(node["source_refs"], json!(["page:00001"]));
    }
    assert_eq!(value["edges"].as_array().unwrap().len(), 2);

    let data: GraphData = serde_json::from_value(value).unwrap();
    let back = Graph::try_from(data).unwrap();
    assert_eq!(back, graph);
}

#[test]
fn test_ids_are_type_prefixed_digests() {
    let inv = invoice("F-1", acme("1 Main St"), vec![]);
    let pipeline = pipeline(GraphConfig::default());
    let graph = pipeline.builder().build_described(&inv, &page(1)).unwrap();

    let org = graph.nodes_of_type("Organization").next().unwrap();
    let (prefix, digest) = org.id.split_once(':').unwrap();
    assert_eq!(prefix, "Organization");
    assert_eq!(digest.len(), 32);
    assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));

    // Same identity values, independent registry and resolver.
    let descriptor = pipeline.registry().describe("Organization").unwrap();
    let other = IdentityResolver::default()
        .resolve(&descriptor, &org.properties)
        .unwrap();
    assert_eq!(other, org.id);
}

#[test]
fn test_keep_both_policy_collects_values() {
    let units: Vec<ExtractionUnit> = ["1 Main St", "9 Side Rd", "1 Main St"]
        .iter()
        .enumerate()
        .map(|(i, addr)| {
            ExtractionUnit::from_typed(page(i + 1), &invoice("F-1", acme(addr), vec![])).unwrap()
        })
        .collect();

    let config = GraphConfig::default().with_conflict_policy(ConflictPolicy::KeepBoth);
    let output = pipeline(config).run("Invoice", &units).unwrap();

    let org = output.graph.nodes_of_type("Organization").next().unwrap();
    assert_eq!(org.property("address"), Some(&json!(["1 Main St", "9 Side Rd"])));
    assert_eq!(output.conflicts.len(), 1);
}

#[test]
fn test_stats_of_run() {
    let units: Vec<ExtractionUnit> = vec![
        ExtractionUnit::from_typed(page(1), &invoice("F-1", acme("A"), vec![garden_work()])).unwrap(),
        ExtractionUnit::from_typed(page(2), &invoice("F-2", acme("A"), vec![])).unwrap(),
    ];
    let output = pipeline(GraphConfig::default()).run("Invoice", &units).unwrap();

    assert_eq!(output.stats, GraphStats::from_graph(&output.graph));
    assert_eq!(output.stats.node_count, 4);
    assert_eq!(output.stats.edge_count, 3);
    assert_eq!(output.stats.node_types["Invoice"], 2);
    assert_eq!(output.stats.edge_types["ISSUED_BY"], 2);
    assert_eq!(output.stats.source_units, 2);
    assert_eq!(output.stats.connected_components, 1);
}

#[test]
fn test_cyclic_schema_rejected_before_building() {
    let mut registry = registry().unwrap();
    registry
        .register_decl(
            TypeDecl::entity("Folder")
                .identity(["name"])
                .scalar("name")
                .entity_list("children", "Folder"),
        )
        .unwrap();
    let pipeline = tessera_core::GraphPipeline::new(registry, GraphConfig::default()).unwrap();

    let units = vec![ExtractionUnit::new(page(1), json!({"name": "root"}))];
    let err = pipeline.build_units("Folder", &units).unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(err.code(), tessera_core::ErrorCode::SchemaCycle);
}
