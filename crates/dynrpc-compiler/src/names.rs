//! Identifier utilities.
//!
//! Qualified identifiers have the form `library.name/Member`. Result and
//! response payload types carry internal separator underscores in their
//! raw spelling (`Echo_Say_Result`); normalization strips them so the same
//! logical name is produced no matter how many times it is applied.

/// Rust reserved words a member name must not collide with.
const RESERVED_WORDS: &[&str] = &[
    "as", "async", "await", "break", "const", "continue", "crate", "dyn", "else", "enum",
    "extern", "false", "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move",
    "mut", "pub", "ref", "return", "self", "static", "struct", "super", "trait", "true", "type",
    "unsafe", "use", "where", "while", "abstract", "become", "box", "do", "final", "macro",
    "override", "priv", "try", "typeof", "unsized", "virtual", "yield",
];

/// Normalizes an identifier. Idempotent: normalizing an already-normalized
/// identifier is a no-op.
pub fn normalize_identifier(ident: &str) -> String {
    if ident.ends_with("_Result") || ident.ends_with("_Response") {
        ident.replace('_', "")
    } else {
        ident.to_string()
    }
}

/// Returns the library part of a qualified identifier:
/// `foo.bar/Baz` yields `foo.bar`.
pub fn library_of(ident: &str) -> &str {
    ident.split('/').next().unwrap_or(ident)
}

/// Returns the normalized member part of a qualified identifier:
/// `foo.bar/Baz_Result` yields `BazResult`.
pub fn member_of(ident: &str) -> String {
    let normalized = normalize_identifier(ident);
    match normalized.split_once('/') {
        Some((_, member)) => member.to_string(),
        None => normalized,
    }
}

/// Returns the protocol marker for a qualified identifier:
/// `foo.bar/Baz` yields `foo.bar.Baz`.
pub fn marker(ident: &str) -> String {
    normalize_identifier(ident).replace('/', ".")
}

/// Converts a camel-case method name to snake case.
pub fn snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() {
            let prev = if i > 0 { Some(chars[i - 1]) } else { None };
            let next = chars.get(i + 1);
            let after_lower = prev.is_some_and(|p| p.is_ascii_lowercase() || p.is_ascii_digit());
            let cap_run_end = prev.is_some_and(|p| p.is_ascii_uppercase())
                && next.is_some_and(|n| n.is_ascii_lowercase());
            if after_lower || cap_run_end {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Produces the binding-safe member name: snake case, with a trailing
/// underscore when the result collides with a reserved word.
pub fn escape_member(name: &str) -> String {
    let name = snake_case(name);
    if RESERVED_WORDS.contains(&name.as_str()) {
        format!("{name}_")
    } else {
        name
    }
}
