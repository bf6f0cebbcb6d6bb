//! The binding registry.
//!
//! A [`Registry`] owns every process-wide cache the compiler needs: the
//! map from library name to IR file, the parsed IR documents, and the
//! materialized namespaces. It is constructed once, queried by name, and
//! passed by reference to every component that needs it. All caches are
//! get-or-create and append-only; repeated lookups return the identical
//! `Arc` instance, which keeps compiled declarations identity-stable.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tracing::debug;

use dynrpc_common::{DynrpcError, Result};

use crate::ir::IrDocument;
use crate::module::{self, Export, Namespace};
use crate::names;
use crate::resolve::DeclKind;

/// Environment variable naming the IR search directory.
pub const IR_PATH_ENV: &str = "DYNRPC_IR_PATH";

/// File suffix of an IR document.
const IR_SUFFIX: &str = ".ir.json";

pub struct Registry {
    search_path: Option<PathBuf>,
    lib_map: RwLock<HashMap<String, PathBuf>>,
    ir_cache: RwLock<HashMap<String, Arc<IrDocument>>>,
    namespaces: RwLock<HashMap<String, Arc<Namespace>>>,
}

impl Registry {
    /// Creates an empty registry. Libraries must be registered through
    /// [`Registry::add_ir_file`] or [`Registry::add_ir_json`].
    pub fn new() -> Self {
        Self {
            search_path: None,
            lib_map: RwLock::new(HashMap::new()),
            ir_cache: RwLock::new(HashMap::new()),
            namespaces: RwLock::new(HashMap::new()),
        }
    }

    /// Creates a registry that resolves libraries under `dir`.
    ///
    /// The directory is scanned once: a subdirectory `lib` maps to
    /// `lib/lib.ir.json`, and a flat `lib.ir.json` file maps to `lib`.
    pub fn with_search_path(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let lib_map = scan_ir_dir(&dir)?;
        debug!(path = %dir.display(), libraries = lib_map.len(), "scanned IR search path");
        Ok(Self {
            search_path: Some(dir),
            lib_map: RwLock::new(lib_map),
            ir_cache: RwLock::new(HashMap::new()),
            namespaces: RwLock::new(HashMap::new()),
        })
    }

    /// Creates a registry from the `DYNRPC_IR_PATH` environment variable.
    pub fn from_env() -> Result<Self> {
        let dir = std::env::var_os(IR_PATH_ENV)
            .ok_or(DynrpcError::IrPathNotConfigured(IR_PATH_ENV))?;
        Self::with_search_path(PathBuf::from(dir))
    }

    fn search_path_display(&self) -> String {
        self.search_path
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "<no search path>".to_string())
    }

    /// Parses and registers the IR document at `path`, keyed by the
    /// library name the document declares.
    pub fn add_ir_file(&self, path: impl AsRef<Path>) -> Result<Arc<IrDocument>> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let doc: IrDocument =
            serde_json::from_str(&text).map_err(|source| DynrpcError::IrParse {
                path: path.display().to_string(),
                source,
            })?;
        self.lib_map
            .write()
            .expect("registry lock")
            .insert(doc.name.clone(), path.to_path_buf());
        Ok(self.cache_ir(doc))
    }

    /// Parses and registers an in-memory IR document.
    pub fn add_ir_json(&self, document: serde_json::Value) -> Result<Arc<IrDocument>> {
        let doc: IrDocument =
            serde_json::from_value(document).map_err(|source| DynrpcError::IrParse {
                path: "<in-memory>".to_string(),
                source,
            })?;
        Ok(self.cache_ir(doc))
    }

    fn cache_ir(&self, doc: IrDocument) -> Arc<IrDocument> {
        let library = doc.name.clone();
        let mut cache = self.ir_cache.write().expect("registry lock");
        cache
            .entry(library)
            .or_insert_with(|| Arc::new(doc))
            .clone()
    }

    /// Resolves a library name to its parsed IR document.
    ///
    /// Idempotent: repeated calls return the identical cached instance.
    pub fn load_ir(&self, library: &str) -> Result<Arc<IrDocument>> {
        if let Some(ir) = self.ir_cache.read().expect("registry lock").get(library) {
            return Ok(ir.clone());
        }
        let path = self
            .lib_map
            .read()
            .expect("registry lock")
            .get(library)
            .cloned()
            .ok_or_else(|| DynrpcError::LibraryNotFound {
                library: library.to_string(),
                path: self.search_path_display(),
            })?;
        let text = fs::read_to_string(&path)?;
        let doc: IrDocument =
            serde_json::from_str(&text).map_err(|source| DynrpcError::IrParse {
                path: path.display().to_string(),
                source,
            })?;
        debug!(library, path = %path.display(), "loaded IR document");
        Ok(self.cache_ir(doc))
    }

    /// Returns the materialized namespace for a library, compiling it on
    /// first reference. Idempotent: the same `Arc` is returned for the
    /// life of the registry.
    pub fn namespace(&self, library: &str) -> Result<Arc<Namespace>> {
        if let Some(ns) = self.namespaces.read().expect("registry lock").get(library) {
            return Ok(ns.clone());
        }
        let ir = self.load_ir(library)?;
        let ns = Arc::new(module::materialize(&ir, self)?);
        let mut cache = self.namespaces.write().expect("registry lock");
        Ok(cache.entry(library.to_string()).or_insert(ns).clone())
    }

    /// Resolves the declaration kind of a qualified identifier, looking in
    /// the containing library first and chasing the identifier's namespace
    /// prefix into other libraries on a miss.
    pub fn resolve_kind(&self, ident: &str, containing: &IrDocument) -> Result<DeclKind> {
        let kind = match containing.declaration(ident) {
            Some(kind) => kind.to_string(),
            None => {
                let library = names::library_of(ident);
                let ir = self.load_ir(library)?;
                ir.declaration(ident)
                    .ok_or_else(|| DynrpcError::UnresolvedKind(ident.to_string()))?
                    .to_string()
            }
        };
        DeclKind::parse(&kind).ok_or_else(|| DynrpcError::UnsupportedKind {
            what: "declaration",
            kind,
            library: names::library_of(ident).to_string(),
        })
    }

    /// Resolves a qualified identifier to its kind and the IR document
    /// declaring it.
    pub fn declaration_ir(&self, ident: &str) -> Result<(DeclKind, Arc<IrDocument>)> {
        let ir = self.load_ir(names::library_of(ident))?;
        let kind = ir
            .declaration(ident)
            .ok_or_else(|| DynrpcError::UnresolvedKind(ident.to_string()))?;
        let kind = DeclKind::parse(kind).ok_or_else(|| DynrpcError::UnsupportedKind {
            what: "declaration",
            kind: kind.to_string(),
            library: names::library_of(ident).to_string(),
        })?;
        Ok((kind, ir))
    }

    /// Resolves a qualified identifier to its compiled export,
    /// materializing the declaring library's namespace if needed.
    pub fn compiled(&self, ident: &str) -> Result<Export> {
        let ns = self.namespace(names::library_of(ident))?;
        let member = names::member_of(ident);
        ns.get(&member)
            .cloned()
            .ok_or_else(|| DynrpcError::UnknownDeclaration(ident.to_string()))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

fn scan_ir_dir(dir: &Path) -> Result<HashMap<String, PathBuf>> {
    let mut map = HashMap::new();
    let entries = fs::read_dir(dir).map_err(|_| DynrpcError::LibraryNotFound {
        library: "<scan>".to_string(),
        path: dir.display().to_string(),
    })?;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        if path.is_dir() {
            let candidate = path.join(format!("{name}{IR_SUFFIX}"));
            if candidate.is_file() {
                map.insert(name, candidate);
            }
        } else if let Some(library) = name.strip_suffix(IR_SUFFIX) {
            map.insert(library.to_string(), path);
        }
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn point_library(name: &str) -> serde_json::Value {
        json!({
            "name": name,
            "declarations": {(format!("{name}/Point")): "struct"},
            "declaration_order": [format!("{name}/Point")],
            "struct_declarations": [{
                "name": format!("{name}/Point"),
                "members": [
                    {"name": "x", "type": {"kind": "primitive", "subtype": "int32"}},
                ],
            }],
        })
    }

    #[test]
    fn test_load_is_identity_stable() {
        let registry = Registry::new();
        registry.add_ir_json(point_library("test.cache")).unwrap();
        let first = registry.load_ir("test.cache").unwrap();
        let second = registry.load_ir("test.cache").unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let ns_first = registry.namespace("test.cache").unwrap();
        let ns_second = registry.namespace("test.cache").unwrap();
        assert!(Arc::ptr_eq(&ns_first, &ns_second));
    }

    #[test]
    fn test_missing_library_names_path() {
        let registry = Registry::new();
        let err = registry.load_ir("test.absent").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("test.absent"));
        assert!(message.contains("no search path"));
    }

    #[test]
    fn test_cross_library_resolution() {
        let registry = Registry::new();
        registry.add_ir_json(point_library("test.remote")).unwrap();
        let local = registry
            .add_ir_json(json!({
                "name": "test.local",
                "declarations": {"test.local/Wrapper": "struct"},
                "declaration_order": ["test.local/Wrapper"],
                "struct_declarations": [{
                    "name": "test.local/Wrapper",
                    "members": [{
                        "name": "inner",
                        "type": {"kind": "identifier", "identifier": "test.remote/Point"},
                    }],
                }],
            }))
            .unwrap();
        let kind = registry.resolve_kind("test.remote/Point", &local).unwrap();
        assert_eq!(kind, DeclKind::Struct);

        let ns = registry.namespace("test.local").unwrap();
        assert!(ns.decl("Wrapper").is_ok());
    }

    #[test]
    fn test_search_path_scan() {
        let dir = tempfile::tempdir().unwrap();
        // Subdirectory convention: lib/lib.ir.json.
        let nested = dir.path().join("test.nested");
        fs::create_dir(&nested).unwrap();
        fs::write(
            nested.join("test.nested.ir.json"),
            serde_json::to_vec(&point_library("test.nested")).unwrap(),
        )
        .unwrap();
        // Flat convention: lib.ir.json.
        fs::write(
            dir.path().join("test.flat.ir.json"),
            serde_json::to_vec(&point_library("test.flat")).unwrap(),
        )
        .unwrap();

        let registry = Registry::with_search_path(dir.path()).unwrap();
        assert!(registry.load_ir("test.nested").is_ok());
        assert!(registry.load_ir("test.flat").is_ok());

        let err = registry.load_ir("test.gone").unwrap_err();
        assert!(err.to_string().contains("test.gone"));
    }
}
