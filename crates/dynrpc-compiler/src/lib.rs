//! DynRPC IR Compiler
//!
//! This crate turns IR documents — machine-readable interface descriptions
//! produced by an external compiler — into concrete runtime bindings.
//!
//! # Architecture
//!
//! The pipeline is leaf-first:
//!
//! - **[`Registry`]**: loads and caches IR documents (at most one parse per
//!   library), caches materialized namespaces, and answers cross-library
//!   declaration lookups. Constructed once and passed by reference to
//!   everything that needs it.
//! - **[`resolve`]**: converts a type reference in the IR into a resolved
//!   type descriptor, chasing identifiers into other libraries on demand.
//! - **[`declarations`]**: compiles each declaration kind (struct, table,
//!   union, enum, bits, const, alias, resource) into a tagged runtime
//!   record with defaulting and validated construction.
//! - **[`protocol`]**: compiles protocol declarations into immutable
//!   dispatch metadata shared by every client, server and event-handler
//!   instance.
//! - **[`module`]**: assembles all compiled declarations of one library
//!   into a [`Namespace`], exporting kinds in dependency-safe order.
//!
//! # Example
//!
//! ```no_run
//! use dynrpc_compiler::Registry;
//!
//! # fn main() -> dynrpc_common::Result<()> {
//! let registry = Registry::from_env()?;
//! let namespace = registry.namespace("example.echo")?;
//! let point = namespace.decl("Point")?;
//! let value = point.make_default();
//! # let _ = value;
//! # Ok(())
//! # }
//! ```

pub mod declarations;
pub mod ir;
pub mod module;
pub mod names;
pub mod protocol;
pub mod registry;
pub mod resolve;

pub use declarations::{
    AliasType, BitsType, ConstValue, Declaration, EnumType, Field, ResourceType, StructType,
    TableType, UnionType,
};
pub use ir::{IrDocument, MethodIr, TypeIr};
pub use module::{Export, Namespace};
pub use protocol::{build_payload, MethodInfo, ProtocolInfo};
pub use registry::{Registry, IR_PATH_ENV};
pub use resolve::{resolve, DeclKind, PrimitiveType, Type, TypeKind};
