//! Declaration compiler.
//!
//! Compiles each IR declaration kind into a tagged runtime record: the
//! record carries the declaration's names and documentation, knows how to
//! produce a default value, and validates construction against the
//! declared shape. Type references stay identifier-keyed (resolved through
//! the [`Registry`] on demand), so recursive and forward references cost
//! nothing at compile time.

use dynrpc_common::value::RawHandle;
use dynrpc_common::{DynrpcError, Result, Value, WireCodec};

use crate::ir::{self, docstring};
use crate::names;
use crate::registry::Registry;
use crate::resolve::{resolve, DeclKind, PrimitiveType, Type};

/// Synthetic zero member added to enums that declare none, so a
/// well-defined decode default always exists.
const SYNTHETIC_ZERO_MEMBER: &str = "empty__";

/// A compiled struct, table or union member.
#[derive(Debug, Clone)]
pub struct Field {
    /// Binding-safe member name (snake case, reserved words suffixed).
    pub name: String,
    /// Member name as spelled in the IR.
    pub raw_name: String,
    pub ty: Type,
    pub doc: Option<String>,
}

fn compile_fields(members: &[ir::MemberDecl], ir: &ir::IrDocument, registry: &Registry) -> Result<Vec<Field>> {
    members
        .iter()
        .map(|member| {
            Ok(Field {
                name: names::escape_member(&member.name),
                raw_name: member.name.clone(),
                ty: resolve(&member.ty, ir, registry)?,
                doc: docstring(&member.maybe_attributes),
            })
        })
        .collect()
}

fn find_field<'a>(fields: &'a [Field], name: &str) -> Option<&'a Field> {
    fields
        .iter()
        .find(|field| field.name == name || field.raw_name == name)
}

/// A compiled declaration of any kind.
#[derive(Debug)]
pub enum Declaration {
    Struct(StructType),
    Table(TableType),
    Union(UnionType),
    Enum(EnumType),
    Bits(BitsType),
    Alias(AliasType),
    Resource(ResourceType),
}

impl Declaration {
    /// Normalized qualified name, e.g. `example.echo/Point`.
    pub fn name(&self) -> &str {
        match self {
            Declaration::Struct(d) => &d.name,
            Declaration::Table(d) => &d.name,
            Declaration::Union(d) => &d.name,
            Declaration::Enum(d) => &d.name,
            Declaration::Bits(d) => &d.name,
            Declaration::Alias(d) => &d.name,
            Declaration::Resource(d) => &d.name,
        }
    }

    /// Name as spelled in the IR; this is what the wire codec sees.
    pub fn raw_name(&self) -> &str {
        match self {
            Declaration::Struct(d) => &d.raw_name,
            Declaration::Table(d) => &d.raw_name,
            Declaration::Union(d) => &d.raw_name,
            Declaration::Enum(d) => &d.raw_name,
            Declaration::Bits(d) => &d.raw_name,
            Declaration::Alias(d) => &d.raw_name,
            Declaration::Resource(d) => &d.raw_name,
        }
    }

    pub fn doc(&self) -> Option<&str> {
        match self {
            Declaration::Struct(d) => d.doc.as_deref(),
            Declaration::Table(d) => d.doc.as_deref(),
            Declaration::Union(d) => d.doc.as_deref(),
            Declaration::Enum(d) => d.doc.as_deref(),
            Declaration::Bits(d) => d.doc.as_deref(),
            Declaration::Alias(d) => d.doc.as_deref(),
            Declaration::Resource(d) => d.doc.as_deref(),
        }
    }

    pub fn kind(&self) -> DeclKind {
        match self {
            Declaration::Struct(_) => DeclKind::Struct,
            Declaration::Table(_) => DeclKind::Table,
            Declaration::Union(_) => DeclKind::Union,
            Declaration::Enum(_) => DeclKind::Enum,
            Declaration::Bits(_) => DeclKind::Bits,
            Declaration::Alias(_) => DeclKind::Alias,
            Declaration::Resource(_) => DeclKind::Resource,
        }
    }

    /// Default-construction factory.
    pub fn make_default(&self) -> Value {
        match self {
            Declaration::Struct(d) => d.make_default(),
            Declaration::Table(d) => d.make_default(),
            Declaration::Union(d) => d.make_default(),
            Declaration::Enum(d) => d.make_default(),
            Declaration::Bits(d) => d.make_default(),
            Declaration::Alias(d) => d.make_default(),
            Declaration::Resource(d) => d.make_default(),
        }
    }

    /// Encodes a value of this declaration through the wire codec,
    /// passing the raw qualified type name the codec expects.
    pub fn encode(
        &self,
        codec: &dyn WireCodec,
        library: &str,
        value: &Value,
    ) -> Result<(Vec<u8>, Vec<RawHandle>)> {
        codec.encode(library, self.raw_name(), value)
    }

    pub fn as_struct(&self) -> Option<&StructType> {
        match self {
            Declaration::Struct(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&TableType> {
        match self {
            Declaration::Table(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_union(&self) -> Option<&UnionType> {
        match self {
            Declaration::Union(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<&EnumType> {
        match self {
            Declaration::Enum(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_bits(&self) -> Option<&BitsType> {
        match self {
            Declaration::Bits(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_alias(&self) -> Option<&AliasType> {
        match self {
            Declaration::Alias(d) => Some(d),
            _ => None,
        }
    }
}

/// A compiled struct declaration. Every field is present by construction.
#[derive(Debug)]
pub struct StructType {
    pub name: String,
    pub raw_name: String,
    pub doc: Option<String>,
    pub fields: Vec<Field>,
}

impl StructType {
    pub fn compile(decl: &ir::StructDecl, ir: &ir::IrDocument, registry: &Registry) -> Result<Self> {
        Ok(Self {
            name: names::normalize_identifier(&decl.name),
            raw_name: decl.name.clone(),
            doc: docstring(&decl.maybe_attributes),
            fields: compile_fields(&decl.members, ir, registry)?,
        })
    }

    /// Yields a value with every declared field present, null-initialized.
    pub fn make_default(&self) -> Value {
        Value::Struct {
            ty: self.name.clone(),
            fields: self
                .fields
                .iter()
                .map(|field| (field.name.clone(), Value::Null))
                .collect(),
        }
    }

    /// Constructs a struct value. Every declared field must be named
    /// exactly once.
    pub fn new_value(&self, args: Vec<(String, Value)>) -> Result<Value> {
        let mut fields: Vec<(String, Option<Value>)> = self
            .fields
            .iter()
            .map(|field| (field.name.clone(), None))
            .collect();
        for (name, value) in args {
            let field = find_field(&self.fields, &name).ok_or_else(|| {
                DynrpcError::InvalidArguments {
                    ty: self.name.clone(),
                    detail: format!("unknown member '{name}'"),
                }
            })?;
            let slot = fields
                .iter_mut()
                .find(|(slot_name, _)| *slot_name == field.name)
                .expect("slot for declared field");
            if slot.1.replace(value).is_some() {
                return Err(DynrpcError::InvalidArguments {
                    ty: self.name.clone(),
                    detail: format!("member '{name}' supplied more than once"),
                });
            }
        }
        let fields = fields
            .into_iter()
            .map(|(name, value)| {
                value.map(|v| (name.clone(), v)).ok_or_else(|| {
                    DynrpcError::InvalidArguments {
                        ty: self.name.clone(),
                        detail: format!("missing member '{name}'"),
                    }
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Value::Struct {
            ty: self.name.clone(),
            fields,
        })
    }
}

/// A compiled table declaration. Every field defaults to absent.
#[derive(Debug)]
pub struct TableType {
    pub name: String,
    pub raw_name: String,
    pub doc: Option<String>,
    pub fields: Vec<Field>,
}

impl TableType {
    pub fn compile(decl: &ir::TableDecl, ir: &ir::IrDocument, registry: &Registry) -> Result<Self> {
        Ok(Self {
            name: names::normalize_identifier(&decl.name),
            raw_name: decl.name.clone(),
            doc: docstring(&decl.maybe_attributes),
            fields: compile_fields(&decl.members, ir, registry)?,
        })
    }

    /// Yields a value with every field absent.
    pub fn make_default(&self) -> Value {
        Value::Table {
            ty: self.name.clone(),
            fields: Vec::new(),
        }
    }

    /// Constructs a table value from any subset of the declared fields.
    pub fn new_value(&self, args: Vec<(String, Value)>) -> Result<Value> {
        let mut fields = Vec::with_capacity(args.len());
        for (name, value) in args {
            let field = find_field(&self.fields, &name).ok_or_else(|| {
                DynrpcError::InvalidArguments {
                    ty: self.name.clone(),
                    detail: format!("unknown member '{name}'"),
                }
            })?;
            if fields.iter().any(|(existing, _): &(String, Value)| *existing == field.name) {
                return Err(DynrpcError::InvalidArguments {
                    ty: self.name.clone(),
                    detail: format!("member '{name}' supplied more than once"),
                });
            }
            if !value.is_null() {
                fields.push((field.name.clone(), value));
            }
        }
        Ok(Value::Table {
            ty: self.name.clone(),
            fields,
        })
    }
}

/// The well-known variant set of a result union.
const RESULT_VARIANTS: &[&str] = &["response", "err", "framework_err"];

/// A compiled union declaration: at most one variant holds a value.
#[derive(Debug)]
pub struct UnionType {
    pub name: String,
    pub raw_name: String,
    pub doc: Option<String>,
    pub strict: bool,
    pub is_result: bool,
    pub variants: Vec<Field>,
}

impl UnionType {
    pub fn compile(decl: &ir::UnionDecl, ir: &ir::IrDocument, registry: &Registry) -> Result<Self> {
        let variants = compile_fields(&decl.members, ir, registry)?;
        if decl.is_result {
            for variant in &variants {
                if !RESULT_VARIANTS.contains(&variant.raw_name.as_str()) {
                    return Err(DynrpcError::UnsupportedKind {
                        what: "result union variant",
                        kind: variant.raw_name.clone(),
                        library: ir.name.clone(),
                    });
                }
            }
        }
        Ok(Self {
            name: names::normalize_identifier(&decl.name),
            raw_name: decl.name.clone(),
            doc: docstring(&decl.maybe_attributes),
            strict: decl.strict,
            is_result: decl.is_result,
            variants,
        })
    }

    /// Yields the empty union.
    pub fn make_default(&self) -> Value {
        Value::Union {
            ty: self.name.clone(),
            variant: None,
        }
    }

    /// Constructs a union holding the named variant.
    pub fn new_value(&self, variant: &str, value: Value) -> Result<Value> {
        let field = find_field(&self.variants, variant).ok_or_else(|| {
            DynrpcError::InvalidArguments {
                ty: self.name.clone(),
                detail: format!("unknown variant '{variant}'"),
            }
        })?;
        Ok(Value::Union {
            ty: self.name.clone(),
            variant: Some((field.name.clone(), Box::new(value))),
        })
    }

    /// Constructs a union from named arguments: exactly one variant, or
    /// none for the empty union. Any other arity is rejected.
    pub fn from_args(&self, mut args: Vec<(String, Value)>) -> Result<Value> {
        match args.len() {
            0 => Ok(self.make_default()),
            1 => {
                let (name, value) = args.pop().expect("one argument");
                self.new_value(&name, value)
            }
            n => Err(DynrpcError::InvalidArguments {
                ty: self.name.clone(),
                detail: format!("expected at most one variant, got {n}"),
            }),
        }
    }

    /// Unwraps a result union value: returns the `response` payload, or
    /// fails naming this type and the error variant (`framework_err`
    /// checked before `err`); a union with no variant set fails with the
    /// distinct no-error-or-response fault.
    pub fn unwrap(&self, value: &Value) -> Result<Value> {
        if !self.is_result {
            return Err(DynrpcError::InvalidArguments {
                ty: self.name.clone(),
                detail: "unwrap is only available on result unions".to_string(),
            });
        }
        match value.unwrap_result() {
            Err(DynrpcError::ResultError { error, .. }) => Err(DynrpcError::ResultError {
                ty: self.raw_name.clone(),
                error,
            }),
            Err(DynrpcError::ResultFrameworkError { error, .. }) => {
                Err(DynrpcError::ResultFrameworkError {
                    ty: self.raw_name.clone(),
                    error,
                })
            }
            Err(DynrpcError::NoErrorOrResponse(_)) => {
                Err(DynrpcError::NoErrorOrResponse(self.raw_name.clone()))
            }
            other => other,
        }
    }
}

/// A compiled enum declaration.
#[derive(Debug)]
pub struct EnumType {
    pub name: String,
    pub raw_name: String,
    pub doc: Option<String>,
    pub strict: bool,
    pub underlying: String,
    pub members: Vec<(String, i64)>,
}

impl EnumType {
    pub fn compile(decl: &ir::EnumDecl) -> Result<Self> {
        let mut members = decl
            .members
            .iter()
            .map(|member| Ok((member.name.clone(), parse_int(&member.value.value)?)))
            .collect::<Result<Vec<_>>>()?;
        // Decoding needs a zero default; synthesize one when absent.
        if !members.iter().any(|(_, value)| *value == 0) {
            members.push((SYNTHETIC_ZERO_MEMBER.to_string(), 0));
        }
        Ok(Self {
            name: names::normalize_identifier(&decl.name),
            raw_name: decl.name.clone(),
            doc: docstring(&decl.maybe_attributes),
            strict: decl.strict,
            underlying: decl.underlying.clone(),
            members,
        })
    }

    pub fn make_default(&self) -> Value {
        Value::Enum {
            ty: self.name.clone(),
            value: 0,
        }
    }

    pub fn value_of(&self, member: &str) -> Option<i64> {
        self.members
            .iter()
            .find(|(name, _)| name == member)
            .map(|(_, value)| *value)
    }

    /// Converts a raw integer. Strict enums reject values outside the
    /// member set; flexible enums pass them through.
    pub fn from_raw(&self, raw: i64) -> Result<Value> {
        if self.strict && !self.members.iter().any(|(_, value)| *value == raw) {
            return Err(DynrpcError::Decode {
                ty: self.name.clone(),
                detail: format!("{raw} is not a member of this strict enum"),
            });
        }
        Ok(Value::Enum {
            ty: self.name.clone(),
            value: raw,
        })
    }
}

/// A compiled bits declaration. Flag composition starts from the empty set,
/// so a zero default exists implicitly.
#[derive(Debug)]
pub struct BitsType {
    pub name: String,
    pub raw_name: String,
    pub doc: Option<String>,
    pub strict: bool,
    pub members: Vec<(String, u64)>,
    mask: u64,
}

impl BitsType {
    pub fn compile(decl: &ir::BitsDecl) -> Result<Self> {
        let members = decl
            .members
            .iter()
            .map(|member| Ok((member.name.clone(), parse_uint(&member.value.value)?)))
            .collect::<Result<Vec<_>>>()?;
        let mask = members.iter().fold(0, |mask, (_, bit)| mask | bit);
        Ok(Self {
            name: names::normalize_identifier(&decl.name),
            raw_name: decl.name.clone(),
            doc: docstring(&decl.maybe_attributes),
            strict: decl.strict,
            members,
            mask,
        })
    }

    pub fn make_default(&self) -> Value {
        Value::Bits {
            ty: self.name.clone(),
            value: 0,
        }
    }

    pub fn value_of(&self, member: &str) -> Option<u64> {
        self.members
            .iter()
            .find(|(name, _)| name == member)
            .map(|(_, value)| *value)
    }

    /// Converts a raw flag set. Strict bits reject unknown flags.
    pub fn from_raw(&self, raw: u64) -> Result<Value> {
        if self.strict && raw & !self.mask != 0 {
            return Err(DynrpcError::Decode {
                ty: self.name.clone(),
                detail: format!("{:#x} carries flags outside this strict bits set", raw),
            });
        }
        Ok(Value::Bits {
            ty: self.name.clone(),
            value: raw,
        })
    }
}

/// What an alias ultimately names.
#[derive(Debug, Clone, PartialEq)]
pub enum AliasTarget {
    Primitive(PrimitiveType),
    String,
    /// A vector or array alias; element constraints are not preserved by
    /// the partial type constructor.
    Sequence,
    Named(String),
}

/// A compiled alias: equivalent to its underlying type, keeping the
/// original name and documentation for diagnostics.
#[derive(Debug)]
pub struct AliasType {
    pub name: String,
    pub raw_name: String,
    pub doc: Option<String>,
    pub target: AliasTarget,
}

impl AliasType {
    pub fn compile(decl: &ir::AliasDecl, ir: &ir::IrDocument) -> Result<Self> {
        let ctor = decl.partial_type_ctor.as_ref().ok_or_else(|| {
            DynrpcError::UnsupportedKind {
                what: "alias",
                kind: "<no type constructor>".to_string(),
                library: ir.name.clone(),
            }
        })?;
        let target = if let Some(primitive) = PrimitiveType::parse(&ctor.name) {
            AliasTarget::Primitive(primitive)
        } else {
            match ctor.name.as_str() {
                "string" => AliasTarget::String,
                "vector" | "array" => AliasTarget::Sequence,
                name => AliasTarget::Named(name.to_string()),
            }
        };
        Ok(Self {
            name: names::normalize_identifier(&decl.name),
            raw_name: decl.name.clone(),
            doc: docstring(&decl.maybe_attributes),
            target,
        })
    }

    pub fn make_default(&self) -> Value {
        match &self.target {
            AliasTarget::Primitive(primitive) => primitive_default(*primitive),
            AliasTarget::String => Value::String(String::new()),
            AliasTarget::Sequence => Value::Vector(Vec::new()),
            AliasTarget::Named(_) => Value::Null,
        }
    }
}

/// A compiled experimental resource declaration: an opaque integer.
#[derive(Debug)]
pub struct ResourceType {
    pub name: String,
    pub raw_name: String,
    pub doc: Option<String>,
}

impl ResourceType {
    pub fn compile(decl: &ir::ResourceDecl) -> Self {
        Self {
            name: names::normalize_identifier(&decl.name),
            raw_name: decl.name.clone(),
            doc: docstring(&decl.maybe_attributes),
        }
    }

    pub fn make_default(&self) -> Value {
        Value::UInt(0)
    }
}

/// A compiled constant: a plain (name, resolved value) pair.
#[derive(Debug)]
pub struct ConstValue {
    pub name: String,
    pub raw_name: String,
    pub doc: Option<String>,
    pub value: Value,
}

impl ConstValue {
    pub fn compile(decl: &ir::ConstDecl, ir: &ir::IrDocument, registry: &Registry) -> Result<Self> {
        let value = match &decl.ty {
            ir::TypeIr::Primitive { subtype } => {
                let primitive = PrimitiveType::parse(subtype).ok_or_else(|| {
                    DynrpcError::UnsupportedKind {
                        what: "constant",
                        kind: subtype.clone(),
                        library: ir.name.clone(),
                    }
                })?;
                primitive_value(primitive, &decl.value.value)?
            }
            ir::TypeIr::String { .. } => Value::String(decl.value.value.clone()),
            ir::TypeIr::Identifier { identifier, .. } => {
                identifier_const_value(identifier, &decl.value.value, ir, registry)?
            }
            _ => {
                return Err(DynrpcError::UnsupportedKind {
                    what: "constant",
                    kind: "<non-literal type>".to_string(),
                    library: ir.name.clone(),
                })
            }
        };
        Ok(Self {
            name: names::normalize_identifier(&decl.name),
            raw_name: decl.name.clone(),
            doc: docstring(&decl.maybe_attributes),
            value,
        })
    }
}

/// Resolves an identifier-typed constant (enum member, bits member, or
/// string alias) through the declaring library's IR.
fn identifier_const_value(
    ident: &str,
    literal: &str,
    ir: &ir::IrDocument,
    registry: &Registry,
) -> Result<Value> {
    let (kind, target_ir) = registry.declaration_ir(ident)?;
    match kind {
        DeclKind::Enum => {
            let decl = target_ir
                .enum_declarations
                .iter()
                .find(|decl| decl.name == ident)
                .ok_or_else(|| DynrpcError::UnresolvedKind(ident.to_string()))?;
            EnumType::compile(decl)?.from_raw(parse_int(literal)?)
        }
        DeclKind::Bits => {
            let decl = target_ir
                .bits_declarations
                .iter()
                .find(|decl| decl.name == ident)
                .ok_or_else(|| DynrpcError::UnresolvedKind(ident.to_string()))?;
            BitsType::compile(decl)?.from_raw(parse_uint(literal)?)
        }
        DeclKind::Alias => Ok(Value::String(literal.to_string())),
        other => Err(DynrpcError::UnsupportedKind {
            what: "constant identifier",
            kind: other.as_str().to_string(),
            library: ir.name.clone(),
        }),
    }
}

fn parse_int(literal: &str) -> Result<i64> {
    literal
        .parse::<i64>()
        .or_else(|_| literal.parse::<u64>().map(|value| value as i64))
        .map_err(|_| DynrpcError::MalformedMessage(format!("'{literal}' is not an integer")))
}

fn parse_uint(literal: &str) -> Result<u64> {
    literal
        .parse::<u64>()
        .map_err(|_| DynrpcError::MalformedMessage(format!("'{literal}' is not an unsigned integer")))
}

/// Converts a literal using the primitive's conversion rule.
pub fn primitive_value(primitive: PrimitiveType, literal: &str) -> Result<Value> {
    if primitive == PrimitiveType::Bool {
        return match literal {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            other => Err(DynrpcError::MalformedMessage(format!(
                "'{other}' is not a bool"
            ))),
        };
    }
    if primitive.is_float() {
        let value = literal.parse::<f64>().map_err(|_| {
            DynrpcError::MalformedMessage(format!("'{literal}' is not a float"))
        })?;
        return Ok(Value::Float(value));
    }
    if primitive.is_signed() {
        Ok(Value::Int(parse_int(literal)?))
    } else {
        Ok(Value::UInt(parse_uint(literal)?))
    }
}

fn primitive_default(primitive: PrimitiveType) -> Value {
    if primitive == PrimitiveType::Bool {
        Value::Bool(false)
    } else if primitive.is_float() {
        Value::Float(0.0)
    } else if primitive.is_signed() {
        Value::Int(0)
    } else {
        Value::UInt(0)
    }
}
