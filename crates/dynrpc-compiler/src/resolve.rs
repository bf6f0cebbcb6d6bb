//! Type resolution.
//!
//! Converts a [`TypeIr`] reference into a resolved [`Type`] descriptor.
//! Identifier references are chased through the owning library's
//! declaration table and, on a miss, into the library named by the
//! identifier's namespace prefix (loaded lazily through the [`Registry`]).
//! Nullability wraps last, uniformly, regardless of kind.

use dynrpc_common::{DynrpcError, Result};

use crate::ir::{IrDocument, TypeIr};
use crate::registry::Registry;

/// Declaration kinds a qualified identifier can resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Bits,
    Enum,
    Struct,
    Table,
    Union,
    Const,
    Alias,
    Protocol,
    Resource,
}

impl DeclKind {
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "bits" => Some(DeclKind::Bits),
            "enum" => Some(DeclKind::Enum),
            "struct" => Some(DeclKind::Struct),
            "table" => Some(DeclKind::Table),
            "union" => Some(DeclKind::Union),
            "const" => Some(DeclKind::Const),
            "alias" => Some(DeclKind::Alias),
            "protocol" => Some(DeclKind::Protocol),
            "experimental_resource" => Some(DeclKind::Resource),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeclKind::Bits => "bits",
            DeclKind::Enum => "enum",
            DeclKind::Struct => "struct",
            DeclKind::Table => "table",
            DeclKind::Union => "union",
            DeclKind::Const => "const",
            DeclKind::Alias => "alias",
            DeclKind::Protocol => "protocol",
            DeclKind::Resource => "experimental_resource",
        }
    }
}

/// Primitive wire types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float32,
    Float64,
}

impl PrimitiveType {
    pub fn parse(subtype: &str) -> Option<Self> {
        match subtype {
            "bool" => Some(PrimitiveType::Bool),
            "int8" => Some(PrimitiveType::Int8),
            "int16" => Some(PrimitiveType::Int16),
            "int32" => Some(PrimitiveType::Int32),
            "int64" => Some(PrimitiveType::Int64),
            "uint8" => Some(PrimitiveType::Uint8),
            "uint16" => Some(PrimitiveType::Uint16),
            "uint32" => Some(PrimitiveType::Uint32),
            "uint64" => Some(PrimitiveType::Uint64),
            "float32" => Some(PrimitiveType::Float32),
            "float64" => Some(PrimitiveType::Float64),
            _ => None,
        }
    }

    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            PrimitiveType::Int8 | PrimitiveType::Int16 | PrimitiveType::Int32 | PrimitiveType::Int64
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self, PrimitiveType::Float32 | PrimitiveType::Float64)
    }
}

/// A resolved type descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct Type {
    pub kind: TypeKind,
    pub nullable: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    Primitive(PrimitiveType),
    String,
    Vector(Box<Type>),
    Array {
        element: Box<Type>,
        count: Option<u64>,
    },
    Handle(String),
    /// A named declaration, kept by identifier so recursive and forward
    /// references need no up-front compilation.
    Identifier {
        ident: String,
        kind: DeclKind,
    },
    ClientEndpoint {
        protocol: String,
    },
    ServerEndpoint {
        protocol: String,
    },
    Internal(String),
}

/// Resolves a type reference against its containing library.
pub fn resolve(ty: &TypeIr, ir: &IrDocument, registry: &Registry) -> Result<Type> {
    let (kind, nullable) = match ty {
        TypeIr::Primitive { subtype } => {
            let primitive = PrimitiveType::parse(subtype).ok_or_else(|| {
                DynrpcError::UnsupportedKind {
                    what: "primitive",
                    kind: subtype.clone(),
                    library: ir.name.clone(),
                }
            })?;
            (TypeKind::Primitive(primitive), false)
        }
        TypeIr::String { nullable } => (TypeKind::String, *nullable),
        TypeIr::Vector {
            element_type,
            nullable,
        } => {
            let element = resolve(element_type, ir, registry)?;
            (TypeKind::Vector(Box::new(element)), *nullable)
        }
        TypeIr::Array {
            element_type,
            element_count,
        } => {
            let element = resolve(element_type, ir, registry)?;
            (
                TypeKind::Array {
                    element: Box::new(element),
                    count: *element_count,
                },
                false,
            )
        }
        TypeIr::Handle { subtype, nullable } => (TypeKind::Handle(subtype.clone()), *nullable),
        TypeIr::Identifier {
            identifier,
            nullable,
        } => {
            let kind = registry.resolve_kind(identifier, ir)?;
            (
                TypeKind::Identifier {
                    ident: identifier.clone(),
                    kind,
                },
                *nullable,
            )
        }
        TypeIr::Endpoint {
            role,
            protocol,
            nullable,
        } => {
            let kind = match role.as_str() {
                "client" => TypeKind::ClientEndpoint {
                    protocol: protocol.clone(),
                },
                "server" => TypeKind::ServerEndpoint {
                    protocol: protocol.clone(),
                },
                other => {
                    return Err(DynrpcError::UnsupportedKind {
                        what: "endpoint role",
                        kind: other.to_string(),
                        library: ir.name.clone(),
                    })
                }
            };
            (kind, *nullable)
        }
        TypeIr::Internal { subtype } => (TypeKind::Internal(subtype.clone()), false),
    };
    Ok(Type { kind, nullable })
}
