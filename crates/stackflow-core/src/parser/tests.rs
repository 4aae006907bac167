use super::*;
use crate::error::StackError;
use crate::model::{OutputRef, Projection};
use serde_json::json;

const WORKSHOP: &str = r#"
project "workshop"

resource "domain" kind="digitalocean:domain" {
    name "workshop.example.dev"
}

resource "workshop-cluster" kind="digitalocean:kubernetes" {
    region "nyc1"
    version "1.29"
    node_pool name="default" size="s-2vcpu-4gb" count=3
}

resource "do-k8s" kind="kubernetes:provider" parent="workshop-cluster" {
    input "kubeconfig" from="workshop-cluster" output="kube_configs" path="[0].raw_config"
}

resource "platform" kind="kubernetes:namespace" parent="do-k8s" provider="do-k8s" {
    metadata name="platform"
}

export "kubeconfig" from="workshop-cluster" output="kube_configs" path="[0].raw_config" secret=#true
export "endpoint" from="workshop-cluster" output="endpoint"
"#;

#[test]
fn test_parse_workshop_stack() {
    let stack = parse_kdl_string(WORKSHOP, "default".to_string()).unwrap();

    assert_eq!(stack.name, "workshop");
    let names: Vec<_> = stack.declarations.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, ["domain", "workshop-cluster", "do-k8s", "platform"]);
}

#[test]
fn test_parse_resource_payload() {
    let stack = parse_kdl_string(WORKSHOP, "default".to_string()).unwrap();

    let cluster = stack.declaration("workshop-cluster").unwrap();
    assert_eq!(cluster.kind, "digitalocean:kubernetes");
    assert_eq!(
        cluster.payload,
        json!({
            "region": "nyc1",
            "version": "1.29",
            "node_pool": { "name": "default", "size": "s-2vcpu-4gb", "count": 3 }
        })
    );
}

#[test]
fn test_parse_parent_provider_and_input() {
    let stack = parse_kdl_string(WORKSHOP, "default".to_string()).unwrap();

    let provider = stack.declaration("do-k8s").unwrap();
    assert_eq!(provider.parent.as_deref(), Some("workshop-cluster"));
    assert_eq!(provider.provider, None);
    assert_eq!(provider.inputs.len(), 1);
    assert_eq!(provider.inputs[0].input, "kubeconfig");
    assert_eq!(
        provider.inputs[0].from,
        OutputRef::new("workshop-cluster", "kube_configs")
            .with_projection(Projection::identity().index(0).field("raw_config"))
    );
    // input ノードはペイロードに含まれない
    assert_eq!(provider.payload, json!({}));

    let namespace = stack.declaration("platform").unwrap();
    assert_eq!(namespace.parent.as_deref(), Some("do-k8s"));
    assert_eq!(namespace.provider.as_deref(), Some("do-k8s"));
}

#[test]
fn test_parse_exports() {
    let stack = parse_kdl_string(WORKSHOP, "default".to_string()).unwrap();

    let kubeconfig = stack.export("kubeconfig").unwrap();
    assert!(kubeconfig.secret);
    assert_eq!(kubeconfig.from.source, "workshop-cluster");
    assert_eq!(kubeconfig.from.projection.to_string(), "[0].raw_config");

    let endpoint = stack.export("endpoint").unwrap();
    assert!(!endpoint.secret);
    assert!(endpoint.from.projection.is_identity());
}

#[test]
fn test_parse_payload_lists_and_repeats() {
    let kdl = r#"
resource "nginx-ingress" kind="helm:release" {
    chart "ingress-nginx"
    set name="controller.replicaCount" value=2
    set name="controller.service.type" value="LoadBalancer"
    hosts {
        - "a.example.dev"
        - "b.example.dev"
    }
    ports 80 443
}
"#;
    let stack = parse_kdl_string(kdl, "test".to_string()).unwrap();
    let payload = &stack.declarations[0].payload;

    assert_eq!(payload["chart"], "ingress-nginx");
    assert_eq!(
        payload["set"],
        json!([
            { "name": "controller.replicaCount", "value": 2 },
            { "name": "controller.service.type", "value": "LoadBalancer" }
        ])
    );
    assert_eq!(payload["hosts"], json!({ "items": ["a.example.dev", "b.example.dev"] }));
    assert_eq!(payload["ports"], json!([80, 443]));
}

#[test]
fn test_resource_without_kind_is_error() {
    let kdl = r#"resource "domain" { name "example.dev" }"#;
    let err = parse_kdl_string(kdl, "test".to_string()).unwrap_err();
    assert!(matches!(err, StackError::InvalidConfig(msg) if msg.contains("domain")));
}

#[test]
fn test_input_requires_from_and_output() {
    let kdl = r#"
resource "do-k8s" kind="kubernetes:provider" {
    input "kubeconfig" from="workshop-cluster"
}
"#;
    let err = parse_kdl_string(kdl, "test".to_string()).unwrap_err();
    assert!(err.to_string().contains("output"), "{err}");
}

#[test]
fn test_invalid_projection_path_is_error() {
    let kdl = r#"export "kubeconfig" from="cluster" output="kube_configs" path="[zero]""#;
    let err = parse_kdl_string(kdl, "test".to_string()).unwrap_err();
    assert!(matches!(err, StackError::InvalidProjection(_)));
}

#[test]
fn test_environment_scoped_resources() {
    let kdl = r#"
resource "domain" kind="digitalocean:domain" {}

environment "prod" {
    resource "backup" kind="digitalocean:spaces" {}
    export "backup-bucket" from="backup" output="bucket"
}

environment "dev" {}
"#;
    let prod = parse_kdl_string_with_environment(kdl, "test".to_string(), Some("prod")).unwrap();
    assert_eq!(prod.declarations.len(), 2);
    assert_eq!(prod.declarations[1].name, "backup");
    assert!(prod.export("backup-bucket").is_some());
    assert_eq!(prod.environments, ["prod", "dev"]);

    let dev = parse_kdl_string_with_environment(kdl, "test".to_string(), Some("dev")).unwrap();
    assert_eq!(dev.declarations.len(), 1);
    assert!(dev.exports.is_empty());

    let none = parse_kdl_string(kdl, "test".to_string()).unwrap();
    assert_eq!(none.declarations.len(), 1);
}

#[test]
fn test_parse_variables_block() {
    let kdl = r#"
variables {
    region "nyc1"
    node_count 3
}
"#;
    let stack = parse_kdl_string(kdl, "test".to_string()).unwrap();
    assert_eq!(stack.variables["region"], "nyc1");
    assert_eq!(stack.variables["node_count"], "3");
}

#[test]
fn test_unknown_nodes_are_skipped() {
    let kdl = r#"
description "ignored"
resource "domain" kind="digitalocean:domain" {}
"#;
    let stack = parse_kdl_string(kdl, "test".to_string()).unwrap();
    assert_eq!(stack.declarations.len(), 1);
}

#[test]
fn test_default_name_when_no_project() {
    let stack = parse_kdl_string("", "fallback".to_string()).unwrap();
    assert_eq!(stack.name, "fallback");
    assert!(stack.declarations.is_empty());
}

#[test]
fn test_parse_kdl_file_uses_directory_name() {
    let dir = tempfile::tempdir().unwrap();
    let project = dir.path().join("edge-stack");
    std::fs::create_dir_all(&project).unwrap();
    let path = project.join("stack.kdl");
    std::fs::write(&path, r#"resource "domain" kind="digitalocean:domain" {}"#).unwrap();

    let stack = parse_kdl_file(&path).unwrap();
    assert_eq!(stack.name, "edge-stack");
}

#[test]
fn test_node_to_payload_shapes() {
    let doc: kdl::KdlDocument = r#"
scalar "x"
empty
args 1 2 mixed=#true
"#
    .parse()
    .unwrap();
    let nodes = doc.nodes();
    assert_eq!(node_to_payload(&nodes[0]), json!("x"));
    assert_eq!(node_to_payload(&nodes[1]), json!(null));
    assert_eq!(node_to_payload(&nodes[2]), json!({ "args": [1, 2], "mixed": true }));
}
