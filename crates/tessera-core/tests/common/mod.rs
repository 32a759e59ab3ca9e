//! Invoice schema shared by the integration tests.

#![allow(dead_code)]

use serde::Serialize;
use tessera_core::{
    Describe, GraphConfig, GraphPipeline, SchemaRegistry, SourceRef, TesseraResult, TypeDecl,
};

#[derive(Debug, Clone, Serialize)]
pub struct Address {
    pub street: String,
    pub city: String,
}

impl Describe for Address {
    fn declare() -> TypeDecl {
        TypeDecl::component("Address").scalar("street").scalar("city")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Organization {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl Describe for Organization {
    fn declare() -> TypeDecl {
        TypeDecl::entity("Organization")
            .identity(["name"])
            .scalar("name")
            .optional_scalar("address")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Person {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home: Option<Address>,
}

impl Describe for Person {
    fn declare() -> TypeDecl {
        TypeDecl::entity("Person")
            .identity(["name"])
            .scalar("name")
            .component_field("home", "Address")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LineItem {
    pub description: String,
    pub quantity: u32,
    pub total: f64,
}

impl Describe for LineItem {
    fn declare() -> TypeDecl {
        TypeDecl::entity("LineItem")
            .scalar("description")
            .scalar("quantity")
            .scalar("total")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Invoice {
    pub number: String,
    pub issued_by: Organization,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sent_to: Option<Person>,
    pub items: Vec<LineItem>,
}

impl Describe for Invoice {
    fn declare() -> TypeDecl {
        TypeDecl::entity("Invoice")
            .identity(["number"])
            .scalar("number")
            .edge("issued_by", "Organization", "ISSUED_BY")
            .entity_field("sent_to", "Person")
            .edge_list("items", "LineItem", "CONTAINS_ITEM")
    }
}

pub fn registry() -> TesseraResult<SchemaRegistry> {
    let mut registry = SchemaRegistry::new();
    registry
        .register::<Address>()?
        .register::<Organization>()?
        .register::<Person>()?
        .register::<LineItem>()?
        .register::<Invoice>()?;
    Ok(registry)
}

pub fn pipeline(config: GraphConfig) -> GraphPipeline {
    GraphPipeline::new(registry().unwrap(), config).unwrap()
}

pub fn acme(address: &str) -> Organization {
    Organization {
        name: "Acme Corp".to_string(),
        address: Some(address.to_string()),
    }
}

pub fn garden_work() -> LineItem {
    LineItem {
        description: "Garden work".to_string(),
        quantity: 28,
        total: 3360.0,
    }
}

pub fn invoice(number: &str, issuer: Organization, items: Vec<LineItem>) -> Invoice {
    Invoice {
        number: number.to_string(),
        issued_by: issuer,
        sent_to: None,
        items,
    }
}

pub fn page(number: usize) -> SourceRef {
    SourceRef::page(number)
}
