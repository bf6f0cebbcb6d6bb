//! IR document model.
//!
//! One IR document describes one protocol library: a flat declaration
//! table partitioned by kind, plus a `declaration_order` list giving a
//! safe topological compile order. The records here are a direct serde
//! mapping of the document; anything the compiler derives (normalized
//! identifiers, documentation strings, `has_result`) lives in accessors so
//! the parsed document itself stays read-only.

use std::collections::HashMap;

use serde::Deserialize;

use crate::names;

/// A parsed IR document for one library.
#[derive(Debug, Deserialize)]
pub struct IrDocument {
    pub name: String,
    #[serde(default)]
    pub maybe_attributes: Vec<Attribute>,
    /// Flat map from qualified raw identifier to declaration kind.
    #[serde(default)]
    pub declarations: HashMap<String, String>,
    /// Topological order guaranteeing forward-reference-free compilation.
    #[serde(default)]
    pub declaration_order: Vec<String>,
    #[serde(default)]
    pub bits_declarations: Vec<BitsDecl>,
    #[serde(default)]
    pub enum_declarations: Vec<EnumDecl>,
    #[serde(default)]
    pub struct_declarations: Vec<StructDecl>,
    #[serde(default)]
    pub table_declarations: Vec<TableDecl>,
    #[serde(default)]
    pub union_declarations: Vec<UnionDecl>,
    #[serde(default)]
    pub const_declarations: Vec<ConstDecl>,
    #[serde(default)]
    pub alias_declarations: Vec<AliasDecl>,
    #[serde(default)]
    pub protocol_declarations: Vec<ProtocolDecl>,
    #[serde(default, rename = "experimental_resource_declarations")]
    pub resource_declarations: Vec<ResourceDecl>,
}

impl IrDocument {
    /// Looks up the declaration kind for a qualified raw identifier.
    pub fn declaration(&self, ident: &str) -> Option<&str> {
        self.declarations.get(ident).map(String::as_str)
    }

    pub fn doc(&self) -> Option<String> {
        docstring(&self.maybe_attributes)
    }

    fn sorted<'a, D: NamedDecl>(&'a self, kind: &str, decls: &'a [D]) -> Vec<&'a D> {
        self.declaration_order
            .iter()
            .filter(|ident| self.declaration(ident) == Some(kind))
            .filter_map(|ident| decls.iter().find(|d| d.raw_name() == ident))
            .collect()
    }

    pub fn sorted_bits(&self) -> Vec<&BitsDecl> {
        self.sorted("bits", &self.bits_declarations)
    }

    pub fn sorted_enums(&self) -> Vec<&EnumDecl> {
        self.sorted("enum", &self.enum_declarations)
    }

    pub fn sorted_structs(&self) -> Vec<&StructDecl> {
        self.sorted("struct", &self.struct_declarations)
    }

    pub fn sorted_tables(&self) -> Vec<&TableDecl> {
        self.sorted("table", &self.table_declarations)
    }

    pub fn sorted_unions(&self) -> Vec<&UnionDecl> {
        self.sorted("union", &self.union_declarations)
    }

    pub fn sorted_consts(&self) -> Vec<&ConstDecl> {
        self.sorted("const", &self.const_declarations)
    }

    pub fn sorted_aliases(&self) -> Vec<&AliasDecl> {
        self.sorted("alias", &self.alias_declarations)
    }

    pub fn sorted_protocols(&self) -> Vec<&ProtocolDecl> {
        self.sorted("protocol", &self.protocol_declarations)
    }

    pub fn sorted_resources(&self) -> Vec<&ResourceDecl> {
        self.sorted("experimental_resource", &self.resource_declarations)
    }
}

trait NamedDecl {
    fn raw_name(&self) -> &str;
}

macro_rules! named_decl {
    ($($ty:ty),*) => {
        $(impl NamedDecl for $ty {
            fn raw_name(&self) -> &str {
                &self.name
            }
        })*
    };
}

named_decl!(
    BitsDecl, EnumDecl, StructDecl, TableDecl, UnionDecl, ConstDecl, AliasDecl, ProtocolDecl,
    ResourceDecl
);

/// A declaration attribute, e.g. the `doc` attribute carrying the
/// declaration's documentation comment.
#[derive(Debug, Deserialize)]
pub struct Attribute {
    pub name: String,
    #[serde(default)]
    pub arguments: Vec<AttributeArg>,
}

#[derive(Debug, Deserialize)]
pub struct AttributeArg {
    pub name: String,
    pub value: ConstantValue,
}

/// A literal constant value as spelled in the IR.
#[derive(Debug, Deserialize)]
pub struct ConstantValue {
    pub value: String,
}

/// Extracts the documentation string from an attribute list.
pub fn docstring(attributes: &[Attribute]) -> Option<String> {
    attributes
        .iter()
        .find(|attr| attr.name == "doc")
        .and_then(|attr| attr.arguments.first())
        .map(|arg| arg.value.value.trim().to_string())
}

/// A struct, table or union member.
#[derive(Debug, Deserialize)]
pub struct MemberDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeIr,
    #[serde(default)]
    pub maybe_attributes: Vec<Attribute>,
}

#[derive(Debug, Deserialize)]
pub struct StructDecl {
    pub name: String,
    #[serde(default)]
    pub maybe_attributes: Vec<Attribute>,
    #[serde(default)]
    pub members: Vec<MemberDecl>,
}

#[derive(Debug, Deserialize)]
pub struct TableDecl {
    pub name: String,
    #[serde(default)]
    pub maybe_attributes: Vec<Attribute>,
    #[serde(default)]
    pub members: Vec<MemberDecl>,
}

#[derive(Debug, Deserialize)]
pub struct UnionDecl {
    pub name: String,
    #[serde(default)]
    pub maybe_attributes: Vec<Attribute>,
    #[serde(default)]
    pub members: Vec<MemberDecl>,
    #[serde(default)]
    pub strict: bool,
    #[serde(default)]
    pub is_result: bool,
}

/// An enum or bits member with its literal value.
#[derive(Debug, Deserialize)]
pub struct ValueMember {
    pub name: String,
    pub value: ConstantValue,
    #[serde(default)]
    pub maybe_attributes: Vec<Attribute>,
}

#[derive(Debug, Deserialize)]
pub struct EnumDecl {
    pub name: String,
    #[serde(default)]
    pub maybe_attributes: Vec<Attribute>,
    #[serde(rename = "type", default = "default_underlying")]
    pub underlying: String,
    #[serde(default)]
    pub members: Vec<ValueMember>,
    #[serde(default)]
    pub strict: bool,
}

#[derive(Debug, Deserialize)]
pub struct BitsDecl {
    pub name: String,
    #[serde(default)]
    pub maybe_attributes: Vec<Attribute>,
    #[serde(default)]
    pub members: Vec<ValueMember>,
    #[serde(default)]
    pub strict: bool,
}

fn default_underlying() -> String {
    "uint32".to_string()
}

#[derive(Debug, Deserialize)]
pub struct ConstDecl {
    pub name: String,
    #[serde(default)]
    pub maybe_attributes: Vec<Attribute>,
    #[serde(rename = "type")]
    pub ty: TypeIr,
    pub value: ConstantValue,
}

#[derive(Debug, Deserialize)]
pub struct AliasDecl {
    pub name: String,
    #[serde(default)]
    pub maybe_attributes: Vec<Attribute>,
    pub partial_type_ctor: Option<PartialTypeCtor>,
}

#[derive(Debug, Deserialize)]
pub struct PartialTypeCtor {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ResourceDecl {
    pub name: String,
    #[serde(default)]
    pub maybe_attributes: Vec<Attribute>,
}

#[derive(Debug, Deserialize)]
pub struct ProtocolDecl {
    pub name: String,
    #[serde(default)]
    pub maybe_attributes: Vec<Attribute>,
    #[serde(default)]
    pub methods: Vec<MethodIr>,
}

/// One protocol method record.
#[derive(Debug, Deserialize)]
pub struct MethodIr {
    pub name: String,
    pub ordinal: u64,
    pub has_request: bool,
    pub has_response: bool,
    #[serde(default)]
    pub strict: bool,
    #[serde(default)]
    pub has_error: bool,
    #[serde(default)]
    pub maybe_attributes: Vec<Attribute>,
    pub maybe_request_payload: Option<TypeIr>,
    pub maybe_response_payload: Option<TypeIr>,
}

impl MethodIr {
    /// Whether the method returns a result union rather than a bare
    /// response: it either declares an error, or is flexible with a
    /// response.
    pub fn has_result(&self) -> bool {
        self.has_error || (!self.strict && self.has_response)
    }

    pub fn request_payload_raw_identifier(&self) -> Option<&str> {
        self.maybe_request_payload
            .as_ref()
            .and_then(TypeIr::raw_identifier)
    }

    pub fn response_payload_raw_identifier(&self) -> Option<&str> {
        self.maybe_response_payload
            .as_ref()
            .and_then(TypeIr::raw_identifier)
    }

    pub fn doc(&self) -> Option<String> {
        docstring(&self.maybe_attributes)
    }
}

/// A type reference inside the IR, tagged by kind.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeIr {
    Primitive {
        subtype: String,
    },
    String {
        #[serde(default)]
        nullable: bool,
    },
    Vector {
        element_type: Box<TypeIr>,
        #[serde(default)]
        nullable: bool,
    },
    Array {
        element_type: Box<TypeIr>,
        element_count: Option<u64>,
    },
    Handle {
        subtype: String,
        #[serde(default)]
        nullable: bool,
    },
    Identifier {
        identifier: String,
        #[serde(default)]
        nullable: bool,
    },
    Endpoint {
        role: String,
        protocol: String,
        #[serde(default)]
        nullable: bool,
    },
    Internal {
        subtype: String,
    },
}

impl TypeIr {
    /// The raw identifier for identifier-kind references.
    pub fn raw_identifier(&self) -> Option<&str> {
        match self {
            TypeIr::Identifier { identifier, .. } => Some(identifier),
            _ => None,
        }
    }

    /// The normalized identifier for identifier-kind references.
    pub fn identifier(&self) -> Option<String> {
        self.raw_identifier().map(names::normalize_identifier)
    }
}
