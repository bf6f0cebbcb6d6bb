//! Module materializer.
//!
//! Assembles every compiled declaration of one library into a single
//! [`Namespace`]. Kinds are processed in a fixed order — bits, resources,
//! enums, structs, tables, unions, consts, aliases, protocols — and within
//! a kind in the IR's `declaration_order`, so any later-processed
//! declaration can safely reference an earlier one.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use dynrpc_common::{DynrpcError, Result};

use crate::declarations::{
    AliasType, BitsType, ConstValue, Declaration, EnumType, ResourceType, StructType, TableType,
    UnionType,
};
use crate::ir::IrDocument;
use crate::names;
use crate::protocol::{compile_protocol, ProtocolInfo};
use crate::registry::Registry;

/// One exported library member.
#[derive(Debug, Clone)]
pub enum Export {
    Decl(Arc<Declaration>),
    Const(Arc<ConstValue>),
    Protocol(Arc<ProtocolInfo>),
}

/// Every exported declaration of one library, keyed by unqualified member
/// name. Created once per library per [`Registry`] and never mutated after
/// population.
#[derive(Debug)]
pub struct Namespace {
    pub library: String,
    pub doc: Option<String>,
    exports: BTreeMap<String, Export>,
}

impl Namespace {
    pub fn get(&self, member: &str) -> Option<&Export> {
        self.exports.get(member)
    }

    /// Looks up a compiled type declaration by member name.
    pub fn decl(&self, member: &str) -> Result<Arc<Declaration>> {
        match self.get(member) {
            Some(Export::Decl(decl)) => Ok(decl.clone()),
            _ => Err(DynrpcError::UnknownDeclaration(format!(
                "{}/{member}",
                self.library
            ))),
        }
    }

    /// Looks up a constant by member name.
    pub fn constant(&self, member: &str) -> Result<Arc<ConstValue>> {
        match self.get(member) {
            Some(Export::Const(value)) => Ok(value.clone()),
            _ => Err(DynrpcError::UnknownDeclaration(format!(
                "{}/{member}",
                self.library
            ))),
        }
    }

    /// Looks up a protocol by member name.
    pub fn protocol(&self, member: &str) -> Result<Arc<ProtocolInfo>> {
        match self.get(member) {
            Some(Export::Protocol(info)) => Ok(info.clone()),
            _ => Err(DynrpcError::UnknownDeclaration(format!(
                "{}/{member}",
                self.library
            ))),
        }
    }

    pub fn members(&self) -> impl Iterator<Item = &str> {
        self.exports.keys().map(String::as_str)
    }

    fn insert(&mut self, name: &str, export: Export) {
        // First writer wins, matching the append-only cache discipline.
        self.exports
            .entry(names::member_of(name))
            .or_insert(export);
    }
}

/// Compiles and exports every declaration of `ir` into a fresh namespace.
pub(crate) fn materialize(ir: &IrDocument, registry: &Registry) -> Result<Namespace> {
    let mut ns = Namespace {
        library: ir.name.clone(),
        doc: ir.doc(),
        exports: BTreeMap::new(),
    };

    for decl in ir.sorted_bits() {
        let compiled = BitsType::compile(decl)?;
        ns.insert(&decl.name, Export::Decl(Arc::new(Declaration::Bits(compiled))));
    }
    for decl in ir.sorted_resources() {
        let compiled = ResourceType::compile(decl);
        ns.insert(
            &decl.name,
            Export::Decl(Arc::new(Declaration::Resource(compiled))),
        );
    }
    for decl in ir.sorted_enums() {
        let compiled = EnumType::compile(decl)?;
        ns.insert(&decl.name, Export::Decl(Arc::new(Declaration::Enum(compiled))));
    }
    for decl in ir.sorted_structs() {
        let compiled = StructType::compile(decl, ir, registry)?;
        ns.insert(
            &decl.name,
            Export::Decl(Arc::new(Declaration::Struct(compiled))),
        );
    }
    for decl in ir.sorted_tables() {
        let compiled = TableType::compile(decl, ir, registry)?;
        ns.insert(
            &decl.name,
            Export::Decl(Arc::new(Declaration::Table(compiled))),
        );
    }
    for decl in ir.sorted_unions() {
        let compiled = UnionType::compile(decl, ir, registry)?;
        ns.insert(
            &decl.name,
            Export::Decl(Arc::new(Declaration::Union(compiled))),
        );
    }
    for decl in ir.sorted_consts() {
        let compiled = ConstValue::compile(decl, ir, registry)?;
        ns.insert(&decl.name, Export::Const(Arc::new(compiled)));
    }
    for decl in ir.sorted_aliases() {
        let compiled = AliasType::compile(decl, ir)?;
        ns.insert(
            &decl.name,
            Export::Decl(Arc::new(Declaration::Alias(compiled))),
        );
    }
    for decl in ir.sorted_protocols() {
        let compiled = compile_protocol(decl, ir, registry)?;
        ns.insert(&decl.name, Export::Protocol(Arc::new(compiled)));
    }

    debug!(
        library = %ns.library,
        exports = ns.exports.len(),
        "materialized namespace"
    );
    Ok(ns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_struct_referencing_later_table_materializes() {
        // `Holder` is declared before `Extras` in source order, but
        // `declaration_order` puts the table first; the identifier-keyed
        // field types make both orders safe.
        let registry = Registry::new();
        registry
            .add_ir_json(json!({
                "name": "test.order",
                "declarations": {
                    "test.order/Holder": "struct",
                    "test.order/Extras": "table",
                },
                "declaration_order": ["test.order/Extras", "test.order/Holder"],
                "struct_declarations": [{
                    "name": "test.order/Holder",
                    "members": [{
                        "name": "extras",
                        "type": {"kind": "identifier", "identifier": "test.order/Extras"},
                    }],
                }],
                "table_declarations": [{
                    "name": "test.order/Extras",
                    "members": [{"name": "label", "type": {"kind": "string"}}],
                }],
            }))
            .unwrap();
        let ns = registry.namespace("test.order").unwrap();
        let holder = ns.decl("Holder").unwrap();
        assert!(holder.as_struct().is_some());
        let members: Vec<_> = ns.members().collect();
        assert_eq!(members, vec!["Extras", "Holder"]);
    }

    #[test]
    fn test_namespace_member_names_are_normalized() {
        let registry = Registry::new();
        registry
            .add_ir_json(json!({
                "name": "test.norm",
                "declarations": {"test.norm/Echo_Say_Result": "union"},
                "declaration_order": ["test.norm/Echo_Say_Result"],
                "union_declarations": [{
                    "name": "test.norm/Echo_Say_Result",
                    "is_result": true,
                    "members": [
                        {"name": "response", "type": {"kind": "string"}},
                        {"name": "err", "type": {"kind": "primitive", "subtype": "int32"}},
                    ],
                }],
            }))
            .unwrap();
        let ns = registry.namespace("test.norm").unwrap();
        let union = ns.decl("EchoSayResult").unwrap();
        assert_eq!(union.name(), "test.norm/EchoSayResult");
        assert_eq!(union.raw_name(), "test.norm/Echo_Say_Result");
    }
}
